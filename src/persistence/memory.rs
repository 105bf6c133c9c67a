//! In-memory implementation of the storage ports.
//!
//! [`InMemoryStore`] keeps every table in a single [`tokio::sync::RwLock`].
//! Each port method takes the lock once, so every read-modify-write
//! (get-or-create draft, quantity increment, compare-and-set transition)
//! is atomic with respect to concurrent callers.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::{
    AppliedResults, LinkPatch, NewStar, ObservationRequest, RequestFilter, RequestId,
    RequestPatch, RequestStarLink, RequestStatus, RequestStore, RequestSummary, Star,
    StarCatalog, StarId, StarPatch, StarResult, StoreError, Transition, User, UserId, UserPatch,
    UserStore,
};

#[derive(Debug, Default)]
struct Tables {
    next_request_id: i64,
    next_user_id: i64,
    next_star_id: i64,
    requests: BTreeMap<RequestId, ObservationRequest>,
    links: BTreeMap<(RequestId, StarId), RequestStarLink>,
    users: HashMap<UserId, User>,
    stars: BTreeMap<StarId, Star>,
}

impl Tables {
    fn next_order_number(&self, request_id: RequestId) -> i32 {
        self.links_of(request_id)
            .map(|l| l.order_number)
            .max()
            .unwrap_or(0)
            .saturating_add(1)
    }

    fn links_of(&self, request_id: RequestId) -> impl Iterator<Item = &RequestStarLink> {
        self.links
            .range((request_id, StarId::new(i64::MIN))..=(request_id, StarId::new(i64::MAX)))
            .map(|(_, link)| link)
    }

    fn request_status(&self, request_id: RequestId) -> Option<RequestStatus> {
        self.requests.get(&request_id).map(|r| r.status)
    }

    /// Mirrors the `moderator_id` foreign key of the durable schema.
    fn check_moderator(&self, transition: &Transition) -> Result<(), StoreError> {
        match transition.moderator_id {
            Some(id) if !self.users.contains_key(&id) => {
                Err(StoreError::NotFound(format!("moderator {id}")))
            }
            _ => Ok(()),
        }
    }

    fn insert_star(&mut self, new: &NewStar) -> Star {
        self.next_star_id = self.next_star_id.saturating_add(1);
        let star = Star {
            id: StarId::new(self.next_star_id),
            name: new.name.clone(),
            short_description: new.short_description.clone(),
            image_url: new.image_url.clone(),
            is_active: true,
            ra: new.ra,
            dec: new.dec,
        };
        self.stars.insert(star.id, star.clone());
        star
    }
}

/// Process-local store for requests, links, users and stars.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a catalog star and returns it with its assigned id.
    pub async fn insert_star(&self, name: &str, ra: f64, dec: f64) -> Star {
        let new = NewStar {
            name: name.to_string(),
            short_description: String::new(),
            image_url: String::new(),
            ra,
            dec,
        };
        self.tables.write().await.insert_star(&new)
    }

    /// Inserts an account under a fixed id, replacing any account with that
    /// id. Later registrations get ids above it.
    pub async fn seed_user(&self, id: UserId, username: &str, is_moderator: bool) -> User {
        let mut tables = self.tables.write().await;
        tables.next_user_id = tables.next_user_id.max(id.get());
        let user = User {
            id,
            username: username.to_string(),
            password_hash: "!".to_string(),
            is_moderator,
        };
        tables.users.insert(id, user.clone());
        user
    }

    /// Returns the number of request rows, deleted ones included.
    pub async fn request_count(&self) -> usize {
        self.tables.read().await.requests.len()
    }
}

#[async_trait]
impl RequestStore for InMemoryStore {
    async fn get_or_create_draft(
        &self,
        creator_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<ObservationRequest, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(draft) = tables
            .requests
            .values()
            .find(|r| r.creator_id == creator_id && r.status == RequestStatus::Draft)
        {
            return Ok(draft.clone());
        }
        tables.next_request_id = tables.next_request_id.saturating_add(1);
        let draft = ObservationRequest {
            id: RequestId::new(tables.next_request_id),
            creator_id,
            moderator_id: None,
            status: RequestStatus::Draft,
            created_at: now,
            formed_at: None,
            completed_at: None,
            observation_date: Some(now),
            observer_latitude: 0.0,
            observer_longitude: 0.0,
        };
        tables.requests.insert(draft.id, draft.clone());
        Ok(draft)
    }

    async fn find_request(
        &self,
        id: RequestId,
    ) -> Result<Option<ObservationRequest>, StoreError> {
        Ok(self.tables.read().await.requests.get(&id).cloned())
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<RequestSummary>, StoreError> {
        let tables = self.tables.read().await;
        let mut summaries: Vec<RequestSummary> = tables
            .requests
            .values()
            .filter(|r| filter.matches(r))
            .map(|r| {
                let (total, completed) = tables.links_of(r.id).fold((0i64, 0i64), |acc, l| {
                    (acc.0 + 1, acc.1 + i64::from(l.result_value.is_some()))
                });
                RequestSummary {
                    request: r.clone(),
                    total_stars: total,
                    completed_stars: completed,
                }
            })
            .collect();
        summaries.sort_by(|a, b| b.request.created_at.cmp(&a.request.created_at));
        Ok(summaries)
    }

    async fn update_request_fields(
        &self,
        id: RequestId,
        expected: RequestStatus,
        patch: &RequestPatch,
    ) -> Result<Option<ObservationRequest>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(request) = tables.requests.get_mut(&id) else {
            return Ok(None);
        };
        if request.status != expected {
            return Ok(None);
        }
        if patch.observation_date.is_some() {
            request.observation_date = patch.observation_date;
        }
        if let Some(lat) = patch.observer_latitude {
            request.observer_latitude = lat;
        }
        if let Some(lon) = patch.observer_longitude {
            request.observer_longitude = lon;
        }
        Ok(Some(request.clone()))
    }

    async fn transition(
        &self,
        id: RequestId,
        transition: &Transition,
    ) -> Result<Option<ObservationRequest>, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.request_status(id) != Some(transition.from) {
            return Ok(None);
        }
        tables.check_moderator(transition)?;
        let Some(request) = tables.requests.get_mut(&id) else {
            return Ok(None);
        };
        transition.apply_to(request);
        Ok(Some(request.clone()))
    }

    async fn add_star_to_draft(
        &self,
        request_id: RequestId,
        star_id: StarId,
    ) -> Result<RequestStarLink, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.request_status(request_id) {
            None => return Err(StoreError::NotFound(format!("request {request_id}"))),
            Some(RequestStatus::Draft) => {}
            Some(status) => {
                return Err(StoreError::Conflict(format!(
                    "request {request_id} is {status}, stars can only be added to a draft"
                )));
            }
        }
        let order_number = tables.next_order_number(request_id);
        let link = tables
            .links
            .entry((request_id, star_id))
            .and_modify(|l| l.quantity = l.quantity.saturating_add(1))
            .or_insert(RequestStarLink {
                request_id,
                star_id,
                order_number,
                quantity: 1,
                result_value: None,
            });
        Ok(link.clone())
    }

    async fn links(&self, request_id: RequestId) -> Result<Vec<RequestStarLink>, StoreError> {
        let tables = self.tables.read().await;
        let mut links: Vec<RequestStarLink> = tables.links_of(request_id).cloned().collect();
        links.sort_by_key(|l| (l.order_number, l.star_id));
        Ok(links)
    }

    async fn update_link(
        &self,
        request_id: RequestId,
        star_id: StarId,
        patch: &LinkPatch,
    ) -> Result<Option<RequestStarLink>, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables.links.get_mut(&(request_id, star_id)).map(|link| {
            patch.apply_to(link);
            link.clone()
        }))
    }

    async fn remove_link(&self, request_id: RequestId, star_id: StarId) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        match tables.request_status(request_id) {
            None => Err(StoreError::NotFound(format!("request {request_id}"))),
            Some(status) if status.allows_link_removal() => {
                tables.links.remove(&(request_id, star_id));
                Ok(())
            }
            Some(status) => Err(StoreError::Conflict(format!(
                "request {request_id} is {status}, stars can no longer be removed"
            ))),
        }
    }

    async fn complete_with_results(
        &self,
        id: RequestId,
        results: &[StarResult],
        completion: &Transition,
    ) -> Result<Option<AppliedResults>, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.request_status(id) != Some(completion.from) {
            return Ok(None);
        }
        let (written, skipped): (Vec<&StarResult>, Vec<&StarResult>) = results
            .iter()
            .partition(|r| tables.links.contains_key(&(id, r.star_id)));
        if !written.is_empty() {
            tables.check_moderator(completion)?;
            for result in &written {
                if let Some(link) = tables.links.get_mut(&(id, result.star_id)) {
                    link.result_value = Some(result.result_value);
                }
            }
        }
        let Some(request) = tables.requests.get_mut(&id) else {
            return Ok(None);
        };
        if !written.is_empty() {
            completion.apply_to(request);
        }
        Ok(Some(AppliedResults {
            request: request.clone(),
            written: written.iter().map(|r| r.star_id).collect(),
            skipped: skipped.iter().map(|r| r.star_id).collect(),
        }))
    }

    async fn cart_count(&self, request_id: RequestId) -> Result<i64, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .links_of(request_id)
            .map(|l| i64::from(l.quantity))
            .sum())
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        is_moderator: bool,
    ) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.username == username) {
            return Err(StoreError::Duplicate(format!("username {username}")));
        }
        tables.next_user_id = tables.next_user_id.saturating_add(1);
        let user = User {
            id: UserId::new(tables.next_user_id),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            is_moderator,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn update_user(
        &self,
        id: UserId,
        patch: &UserPatch,
    ) -> Result<Option<User>, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(name) = &patch.username
            && tables.users.values().any(|u| u.id != id && &u.username == name)
        {
            return Err(StoreError::Duplicate(format!("username {name}")));
        }
        Ok(tables.users.get_mut(&id).map(|user| {
            if let Some(name) = &patch.username {
                user.username.clone_from(name);
            }
            if let Some(hash) = &patch.password_hash {
                user.password_hash.clone_from(hash);
            }
            user.clone()
        }))
    }
}

#[async_trait]
impl StarCatalog for InMemoryStore {
    async fn find_star(&self, id: StarId) -> Result<Option<Star>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .stars
            .get(&id)
            .filter(|s| s.is_active)
            .cloned())
    }

    async fn list_stars(&self, name_filter: Option<&str>) -> Result<Vec<Star>, StoreError> {
        let needle = name_filter.map(str::to_lowercase);
        Ok(self
            .tables
            .read()
            .await
            .stars
            .values()
            .filter(|s| s.is_active)
            .filter(|s| {
                needle
                    .as_deref()
                    .is_none_or(|n| s.name.to_lowercase().contains(n))
            })
            .cloned()
            .collect())
    }

    async fn stars_by_ids(&self, ids: &[StarId]) -> Result<Vec<Star>, StoreError> {
        let tables = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| tables.stars.get(id).cloned()).collect())
    }

    async fn create_star(&self, star: &NewStar) -> Result<Star, StoreError> {
        Ok(self.tables.write().await.insert_star(star))
    }

    async fn update_star(
        &self,
        id: StarId,
        patch: &StarPatch,
    ) -> Result<Option<Star>, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .stars
            .get_mut(&id)
            .filter(|s| s.is_active)
            .map(|star| {
                patch.apply_to(star);
                star.clone()
            }))
    }

    async fn deactivate_star(&self, id: StarId) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(match tables.stars.get_mut(&id) {
            Some(star) if star.is_active => {
                star.is_active = false;
                true
            }
            _ => false,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::*;

    async fn draft(store: &InMemoryStore, creator: i64) -> ObservationRequest {
        let Ok(draft) = store
            .get_or_create_draft(UserId::new(creator), Utc::now())
            .await
        else {
            panic!("draft creation failed");
        };
        draft
    }

    #[tokio::test]
    async fn get_or_create_returns_same_draft() {
        let store = InMemoryStore::new();
        let a = draft(&store, 1).await;
        let b = draft(&store, 1).await;
        assert_eq!(a.id, b.id);
        assert_eq!(store.request_count().await, 1);
    }

    #[tokio::test]
    async fn concurrent_get_or_create_yields_one_draft() {
        let store = Arc::new(InMemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.get_or_create_draft(UserId::new(5), Utc::now()).await
            }));
        }
        for handle in handles {
            let Ok(Ok(_)) = handle.await else {
                panic!("task failed");
            };
        }
        assert_eq!(store.request_count().await, 1);
    }

    #[tokio::test]
    async fn re_adding_star_increments_quantity() {
        let store = InMemoryStore::new();
        let d = draft(&store, 1).await;
        let star = store.insert_star("Vega", 279.2, 38.8).await;

        let _ = store.add_star_to_draft(d.id, star.id).await;
        let Ok(link) = store.add_star_to_draft(d.id, star.id).await else {
            panic!("add failed");
        };
        assert_eq!(link.quantity, 2);
        assert_eq!(link.order_number, 1);
        let Ok(links) = store.links(d.id).await else {
            panic!("links failed");
        };
        assert_eq!(links.len(), 1);
    }

    #[tokio::test]
    async fn order_numbers_increase_per_new_star() {
        let store = InMemoryStore::new();
        let d = draft(&store, 1).await;
        let a = store.insert_star("Vega", 279.2, 38.8).await;
        let b = store.insert_star("Deneb", 310.4, 45.3).await;
        let _ = store.add_star_to_draft(d.id, a.id).await;
        let Ok(link) = store.add_star_to_draft(d.id, b.id).await else {
            panic!("add failed");
        };
        assert_eq!(link.order_number, 2);
    }

    #[tokio::test]
    async fn add_to_formed_request_conflicts() {
        let store = InMemoryStore::new();
        let d = draft(&store, 1).await;
        let t = Transition::new(RequestStatus::Draft, RequestStatus::Formed);
        let _ = store.transition(d.id, &t).await;
        let result = store.add_star_to_draft(d.id, StarId::new(1)).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn transition_is_compare_and_set() {
        let store = InMemoryStore::new();
        let d = draft(&store, 1).await;
        let t = Transition::new(RequestStatus::Draft, RequestStatus::Formed);
        let Ok(first) = store.transition(d.id, &t).await else {
            panic!("transition failed");
        };
        assert!(first.is_some());
        let Ok(second) = store.transition(d.id, &t).await else {
            panic!("transition failed");
        };
        assert!(second.is_none());
    }

    fn completion(moderator: UserId) -> Transition {
        Transition {
            completed_at: Some(Utc::now()),
            moderator_id: Some(moderator),
            ..Transition::new(RequestStatus::Formed, RequestStatus::Completed)
        }
    }

    fn result(star_id: StarId, value: f64) -> StarResult {
        StarResult {
            star_id,
            result_value: value,
        }
    }

    async fn formed_with_star(store: &InMemoryStore) -> (ObservationRequest, Star) {
        let d = draft(store, 1).await;
        let star = store.insert_star("Vega", 279.2, 38.8).await;
        let _ = store.add_star_to_draft(d.id, star.id).await;
        let t = Transition::new(RequestStatus::Draft, RequestStatus::Formed);
        let _ = store.transition(d.id, &t).await;
        (d, star)
    }

    #[tokio::test]
    async fn results_are_written_only_while_formed() {
        let store = InMemoryStore::new();
        let system = store.seed_user(UserId::new(2), "system", true).await;
        let d = draft(&store, 1).await;
        let star = store.insert_star("Vega", 279.2, 38.8).await;
        let _ = store.add_star_to_draft(d.id, star.id).await;

        let batch = [result(star.id, 1.5)];
        assert_eq!(
            store
                .complete_with_results(d.id, &batch, &completion(system.id))
                .await,
            Ok(None)
        );

        let t = Transition::new(RequestStatus::Draft, RequestStatus::Formed);
        let _ = store.transition(d.id, &t).await;
        let Ok(Some(applied)) = store
            .complete_with_results(d.id, &[result(star.id, 1.5), result(StarId::new(999), 2.0)], &completion(system.id))
            .await
        else {
            panic!("results not applied");
        };
        assert_eq!(applied.written, vec![star.id]);
        assert_eq!(applied.skipped, vec![StarId::new(999)]);
        assert_eq!(applied.request.status, RequestStatus::Completed);
        assert_eq!(applied.request.moderator_id, Some(system.id));
    }

    #[tokio::test]
    async fn unknown_moderator_leaves_results_unwritten() {
        let store = InMemoryStore::new();
        let (d, star) = formed_with_star(&store).await;

        let outcome = store
            .complete_with_results(d.id, &[result(star.id, 22.36)], &completion(UserId::new(77)))
            .await;
        assert!(matches!(outcome, Err(StoreError::NotFound(_))));

        let Ok(Some(request)) = store.find_request(d.id).await else {
            panic!("request missing");
        };
        assert_eq!(request.status, RequestStatus::Formed);
        let Ok(links) = store.links(d.id).await else {
            panic!("links failed");
        };
        assert!(links.iter().all(|l| l.result_value.is_none()));
    }

    #[tokio::test]
    async fn batch_without_linked_stars_changes_nothing() {
        let store = InMemoryStore::new();
        let (d, _) = formed_with_star(&store).await;
        let Ok(Some(applied)) = store
            .complete_with_results(d.id, &[result(StarId::new(999), 1.0)], &completion(UserId::new(77)))
            .await
        else {
            panic!("results not applied");
        };
        assert!(applied.written.is_empty());
        assert_eq!(applied.request.status, RequestStatus::Formed);
    }

    #[tokio::test]
    async fn removing_a_link_after_resolution_conflicts() {
        let store = InMemoryStore::new();
        let (d, star) = formed_with_star(&store).await;
        let t = Transition::new(RequestStatus::Formed, RequestStatus::Rejected);
        let _ = store.transition(d.id, &t).await;

        assert!(matches!(
            store.remove_link(d.id, star.id).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            store.remove_link(RequestId::new(404), star.id).await,
            Err(StoreError::NotFound(_))
        ));
        let Ok(links) = store.links(d.id).await else {
            panic!("links failed");
        };
        assert_eq!(links.len(), 1);
    }

    #[tokio::test]
    async fn deactivated_stars_leave_the_catalog() {
        let store = InMemoryStore::new();
        let star = store.insert_star("Vega", 279.2, 38.8).await;
        assert_eq!(store.deactivate_star(star.id).await, Ok(true));
        assert_eq!(store.deactivate_star(star.id).await, Ok(false));
        assert_eq!(store.find_star(star.id).await, Ok(None));
        let Ok(by_id) = store.stars_by_ids(&[star.id]).await else {
            panic!("lookup failed");
        };
        assert_eq!(by_id.len(), 1);
        let patch = StarPatch {
            name: Some("Wega".to_string()),
            ..StarPatch::default()
        };
        assert_eq!(store.update_star(star.id, &patch).await, Ok(None));
    }

    #[tokio::test]
    async fn seeded_user_ids_are_not_reused() {
        let store = InMemoryStore::new();
        let _ = store.seed_user(UserId::new(2), "system", true).await;
        let Ok(user) = store.create_user("ann", "h", false).await else {
            panic!("user creation failed");
        };
        assert_eq!(user.id, UserId::new(3));
    }

    #[tokio::test]
    async fn duplicate_username_rejected() {
        let store = InMemoryStore::new();
        let _ = store.create_user("ann", "h", false).await;
        let result = store.create_user("ann", "h", false).await;
        assert!(matches!(result, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn list_stars_filters_by_name() {
        let store = InMemoryStore::new();
        let _ = store.insert_star("Vega", 279.2, 38.8).await;
        let _ = store.insert_star("Deneb", 310.4, 45.3).await;
        let Ok(found) = store.list_stars(Some("veg")).await else {
            panic!("list failed");
        };
        assert_eq!(found.len(), 1);
    }
}

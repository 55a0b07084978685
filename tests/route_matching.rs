use std::sync::Arc;

use rungogh::config::MatchPolicy;
use rungogh::models::{Coordinate, Health, Route};
use rungogh::routes::{RouteService, RouteStrategyKind};
use rungogh::store::{HealthStore, MemoryStore, Stores, UserStore};
use rungogh::Error;

const SEOUL_CITY_HALL: Coordinate = Coordinate { lat: 37.5665, lng: 126.9780 };

fn shape_near_city_hall() -> Vec<Coordinate> {
    vec![
        Coordinate::new(37.5660, 126.9770),
        Coordinate::new(37.5680, 126.9770),
        Coordinate::new(37.5680, 126.9800),
        Coordinate::new(37.5660, 126.9800),
    ]
}

struct World {
    store: Arc<MemoryStore>,
    service: RouteService,
}

impl World {
    fn new() -> World {
        World::with_policy(MatchPolicy::default())
    }

    fn with_policy(policy: MatchPolicy) -> World {
        let store = Arc::new(MemoryStore::new());
        let service = RouteService::new(Stores::shared(store.clone()), policy);
        World { store, service }
    }

    async fn user(&self, name: &str) -> i64 {
        self.store.create_user(name, &format!("{}@rungogh.test", name)).await.unwrap().id
    }

    async fn route(&self, owner: i64, title: Option<&str>, shape: Vec<Coordinate>) -> Route {
        let staged = self.service.stage_route(owner, shape).await.unwrap();
        match title {
            Some(title) => self.service.finalize_route(owner, staged.id, title, "https://img.rungogh.test/art.png").await.unwrap(),
            None => staged,
        }
    }
}

#[tokio::test]
async fn only_titled_routes_of_other_users_are_offered() {
    let world = World::new();
    let requester = world.user("vincent").await;
    let theo = world.user("theo").await;
    let jo = world.user("jo").await;

    let _a = world.route(requester, Some("Mine"), shape_near_city_hall()).await;
    let _b = world.route(theo, None, shape_near_city_hall()).await;
    let c = world.route(jo, Some("Cheonggyecheon"), shape_near_city_hall()).await;

    let found = world
        .service
        .find_routes(RouteStrategyKind::Others, requester, SEOUL_CITY_HALL, None)
        .await
        .unwrap();
    let ids: Vec<i64> = found.iter().map(|r| r.route_id).collect();
    assert_eq!(ids, vec![c.id]);
    assert_eq!(found[0].title, "Cheonggyecheon");
    assert!(found[0].distance_from_user < 500.0);
}

#[tokio::test]
async fn eligible_routes_keep_recency_order() {
    let world = World::new();
    let requester = world.user("vincent").await;
    let theo = world.user("theo").await;

    let older = world.route(theo, Some("Older"), shape_near_city_hall()).await;
    let newer = world.route(theo, Some("Newer"), shape_near_city_hall()).await;
    // Busan, far outside the search radius
    let _far = world
        .route(theo, Some("Haeundae"), vec![Coordinate::new(35.1587, 129.1604), Coordinate::new(35.1600, 129.1630)])
        .await;

    let found = world
        .service
        .find_routes(RouteStrategyKind::Others, requester, SEOUL_CITY_HALL, Some(2.5))
        .await
        .unwrap();
    let ids: Vec<i64> = found.iter().map(|r| r.route_id).collect();
    assert_eq!(ids, vec![newer.id, older.id]);
    assert!(found.iter().all(|r| r.estimated_time.is_some()));
}

#[tokio::test]
async fn no_eligible_route_is_an_empty_list() {
    let world = World::new();
    let requester = world.user("vincent").await;
    let found = world
        .service
        .find_routes(RouteStrategyKind::Others, requester, SEOUL_CITY_HALL, None)
        .await
        .unwrap();
    assert!(found.is_empty());

    assert!(matches!(
        world.service.find_routes(RouteStrategyKind::Others, 404, SEOUL_CITY_HALL, None).await,
        Err(Error::UserNotFound(404))
    ));
}

#[tokio::test]
async fn stored_pace_is_used_when_none_is_given() {
    let world = World::with_policy(MatchPolicy { max_distance_m: 5_000.0, max_duration_s: 60.0 });
    let requester = world.user("vincent").await;
    let theo = world.user("theo").await;
    let route = world.route(theo, Some("Plaza"), shape_near_city_hall()).await;

    // no pace known: only the distance rule applies
    let found = world.service.find_routes(RouteStrategyKind::Others, requester, SEOUL_CITY_HALL, None).await.unwrap();
    assert_eq!(found.len(), 1);

    // a slow history puts the loop well over a minute
    world
        .store
        .save_health(&Health { user_id: requester, total_distance: 1_000, total_time: 1_000, running_count: 1, total_steps: 0 })
        .await
        .unwrap();
    let found = world.service.find_routes(RouteStrategyKind::Others, requester, SEOUL_CITY_HALL, None).await.unwrap();
    assert!(found.is_empty(), "{} m route offered at 1 m/s", route.distance);

    let found = world
        .service
        .find_routes(RouteStrategyKind::Others, requester, SEOUL_CITY_HALL, Some(100.0))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn finalizing_fixes_center_and_length() {
    let world = World::new();
    let theo = world.user("theo").await;
    let route = world.route(theo, Some("Plaza loop"), shape_near_city_hall()).await;

    assert_eq!(route.title.as_deref(), Some("Plaza loop"));
    assert!((route.center_lat - 37.5670).abs() < 1e-9);
    assert!((route.center_lng - 126.9785).abs() < 1e-9);
    // two 222 m legs and one 265 m leg
    assert!((700..=715).contains(&route.distance), "distance {}", route.distance);
}

#[tokio::test]
async fn finalize_rejects_foreign_routes_and_bad_titles() {
    let world = World::new();
    let theo = world.user("theo").await;
    let jo = world.user("jo").await;
    let staged = world.route(theo, None, shape_near_city_hall()).await;

    assert!(matches!(
        world.service.finalize_route(jo, staged.id, "Stolen", "").await,
        Err(Error::RouteNotFound(_))
    ));
    assert!(matches!(world.service.finalize_route(theo, staged.id, "  ", "").await, Err(Error::InvalidInput(_))));
    let long = "x".repeat(31);
    assert!(matches!(world.service.finalize_route(theo, staged.id, &long, "").await, Err(Error::InvalidInput(_))));

    assert!(matches!(world.service.stage_route(theo, Vec::new()).await, Err(Error::InvalidInput(_))));
    assert!(matches!(world.service.stage_route(999, shape_near_city_hall()).await, Err(Error::UserNotFound(999))));
}

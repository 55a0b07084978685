mod common;

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use serde_json::{json, Value};
use std::sync::Arc;

use common::ScriptedProcessor;
use rungogh::api::{self, AppState, USER_HEADER};
use rungogh::buffer::{MemoryPositionBuffer, PositionBuffer};
use rungogh::config::Config;
use rungogh::processor::TraceProcessor;
use rungogh::store::{MemoryStore, Stores, UserStore};

fn memory_config() -> Config {
    Config::from_lookup(|key| match key {
        "STORAGE" => Some("memory".to_string()),
        _ => None,
    })
    .unwrap()
}

async fn state_with_users(names: &[&str]) -> (web::Data<AppState>, Vec<i64>) {
    let store = Arc::new(MemoryStore::new());
    let mut ids = Vec::new();
    for name in names {
        ids.push(store.create_user(name, &format!("{}@rungogh.test", name)).await.unwrap().id);
    }
    let buffer: Arc<dyn PositionBuffer> = Arc::new(MemoryPositionBuffer::new());
    let processor: Arc<dyn TraceProcessor> = Arc::new(ScriptedProcessor::default());
    let state = AppState::new(Stores::shared(store), buffer, processor, &memory_config());
    (web::Data::new(state), ids)
}

fn as_user(req: test::TestRequest, user_id: i64) -> test::TestRequest {
    req.insert_header((USER_HEADER, user_id.to_string()))
}

#[actix_web::test]
async fn drawing_lifecycle_over_http() {
    let (state, ids) = state_with_users(&["vincent"]).await;
    let u1 = ids[0];
    let app = test::init_service(App::new().app_data(state).configure(api::configure)).await;

    let req = as_user(test::TestRequest::post().uri("/drawings/start?type=free"), u1)
        .set_json(json!({"lat": 37.50, "lng": 127.03, "time": "2024-05-01T09:00:00Z"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], 201);
    let drawing_id = body["data"]["drawingId"].as_i64().unwrap();
    assert_eq!(body["data"]["title"], Value::Null);

    let req = as_user(test::TestRequest::post().uri(&format!("/drawings/{}/positions", drawing_id)), u1)
        .set_json(json!({"lat": 37.5005, "lng": 127.0305, "time": "2024-05-01T09:00:30Z"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = as_user(test::TestRequest::patch().uri(&format!("/drawings/{}/save", drawing_id)), u1)
        .set_json(json!({
            "lat": 37.501, "lng": 127.031, "time": "2024-05-01T09:00:57Z",
            "drawingImage": "https://img.rungogh.test/d1.png",
            "drawingDetailImage": "https://img.rungogh.test/d1-1.png"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["distance"], 120);
    assert_eq!(body["data"]["averageSpeed"], 2.1);

    let req = as_user(test::TestRequest::get().uri(&format!("/drawings/{}", drawing_id)), u1).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["accumulatedImage"], "https://img.rungogh.test/d1.png");
    assert_eq!(body["data"]["isCompleted"], false);

    let complete = json!({
        "positions": [
            {"lat": 37.50, "lng": 127.03, "time": "2024-05-01T09:00:00Z"},
            {"lat": 37.501, "lng": 127.031, "time": "2024-05-01T09:00:57Z"}
        ],
        "title": "Starry night",
        "step": 1200,
        "drawingImage": "https://img.rungogh.test/d1-final.png",
        "drawingDetailImage": "https://img.rungogh.test/d1-2.png"
    });
    let req = as_user(test::TestRequest::patch().uri(&format!("/drawings/{}/complete", drawing_id)), u1)
        .set_json(&complete)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = as_user(test::TestRequest::patch().uri(&format!("/drawings/{}/complete", drawing_id)), u1)
        .set_json(&complete)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "DRAWING_ALREADY_COMPLETED");
    assert_eq!(body["data"], Value::Null);

    let req = as_user(test::TestRequest::patch().uri(&format!("/drawings/{}/publish", drawing_id)), u1).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = as_user(test::TestRequest::get().uri("/users/exercise/week"), u1).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["distance"][6], 240);
}

#[actix_web::test]
async fn boundary_errors_have_distinct_statuses() {
    let (state, ids) = state_with_users(&["vincent"]).await;
    let u1 = ids[0];
    let app = test::init_service(App::new().app_data(state).configure(api::configure)).await;
    let here = json!({"lat": 37.50, "lng": 127.03, "time": "2024-05-01T09:00:00Z"});

    let req = test::TestRequest::post().uri("/drawings/start?type=free").set_json(&here).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = as_user(test::TestRequest::post().uri("/drawings/start?type=walk"), u1).set_json(&here).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "INVALID_MODE");

    let req = as_user(test::TestRequest::post().uri("/drawings/start?type=route"), u1).set_json(&here).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["code"], "ROUTE_REQUIRED");

    let req = as_user(test::TestRequest::post().uri("/drawings/start?type=free"), u1)
        .set_json(json!({"lat": "north"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "INVALID_INPUT");

    let req = as_user(test::TestRequest::get().uri("/drawings/4242"), u1).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "DRAWING_NOT_FOUND");
    assert_eq!(body["status"], 404);
}

#[actix_web::test]
async fn route_creation_and_matching_over_http() {
    let (state, ids) = state_with_users(&["vincent", "theo"]).await;
    let (requester, artist) = (ids[0], ids[1]);
    let app = test::init_service(App::new().app_data(state).configure(api::configure)).await;
    let search = "/routes?type=others&lat=37.5665&lng=126.978";

    let req = as_user(test::TestRequest::get().uri(search), requester).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let req = as_user(test::TestRequest::post().uri("/routes"), artist)
        .set_json(json!({"positions": [
            {"lat": 37.5660, "lng": 126.9770},
            {"lat": 37.5680, "lng": 126.9770},
            {"lat": 37.5680, "lng": 126.9800}
        ]}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let route_id = body["data"]["routeId"].as_i64().unwrap();
    assert_eq!(body["data"]["positions"].as_array().map(Vec::len), Some(3));

    // untitled routes are not offered yet
    let req = as_user(test::TestRequest::get().uri(search), requester).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

    let req = as_user(test::TestRequest::post().uri("/routes/end"), artist)
        .set_json(json!({"routeId": route_id, "title": "City hall", "artImage": "https://img.rungogh.test/r.png"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = as_user(test::TestRequest::get().uri(search), requester).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"][0]["routeId"], route_id);
    assert_eq!(body["data"][0]["title"], "City hall");

    // the artist does not get their own route back
    let req = as_user(test::TestRequest::get().uri(search), artist).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

    let req = as_user(test::TestRequest::get().uri("/routes?type=nearby&lat=37.5&lng=127.0"), requester).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = as_user(test::TestRequest::post().uri("/drawings/start?type=route"), requester)
        .set_json(json!({"lat": 37.5665, "lng": 126.978, "time": "2024-05-01T09:00:00Z", "routeId": route_id}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["title"], "City hall");
    assert_eq!(body["data"]["routePositions"].as_array().map(Vec::len), Some(3));
}

//! Integration tests for the OpenWeather client and the state store against a
//! mock HTTP server.

use std::{
    io::{Read, Write},
    net::TcpListener,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use weather_core::{
    CityQuery, Config, Coordinates, ErrorKind, OpenWeatherClient, QueryState, Source,
    WeatherClient, WeatherStateStore,
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

fn current_body(name: &str) -> serde_json::Value {
    serde_json::json!({
        "coord": {"lon": -0.1257, "lat": 51.5085},
        "weather": [{"id": 800, "main": "Clear", "description": "clear sky", "icon": "01d"}],
        "main": {"temp": 15.2, "feels_like": 14.1, "humidity": 60},
        "dt": 1_700_000_000,
        "name": name,
        "cod": 200
    })
}

fn forecast_body() -> serde_json::Value {
    serde_json::json!({
        "cod": "200",
        "cnt": 3,
        "list": [
            {
                "dt": 1_700_000_000,
                "main": {"temp": 10.0},
                "weather": [{"icon": "02d"}],
                "dt_txt": "2023-11-14 22:13:20"
            },
            {"dt": 1_700_010_800, "main": {"temp": 9.0}, "weather": [{"icon": "03n"}]},
            {
                "dt": 1_700_021_600,
                "main": {"temp": 8.5},
                "weather": [{"icon": "04n", "description": "broken clouds"}]
            }
        ],
        "city": {"id": 2643743, "name": "London", "country": "GB"}
    })
}

fn config_for(mock_server: &MockServer) -> Config {
    Config {
        api_base_url: mock_server.uri(),
        api_key: Some("TEST_KEY".to_string()),
        timeout_secs: 5,
        ..Config::default()
    }
}

fn create_test_client(mock_server: &MockServer) -> OpenWeatherClient {
    OpenWeatherClient::new(&config_for(mock_server)).expect("Failed to create client")
}

async fn mount(mock_server: &MockServer, endpoint: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(endpoint))
        .respond_with(response)
        .mount(mock_server)
        .await;
}

fn london() -> CityQuery {
    CityQuery::new("London").expect("valid query")
}

// ============================================================================
// Success scenarios
// ============================================================================

#[tokio::test]
async fn current_by_city_sends_expected_query() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("q", "London"))
        .and(query_param("appid", "TEST_KEY"))
        .and(query_param("units", "metric"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body("London")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let weather = client.fetch_current_by_city(&london()).await.expect("success");

    assert_eq!(weather.location_name, "London");
    assert_eq!(weather.icon, "01d");
    assert!((weather.temperature - 15.2).abs() < 1e-9);
    assert_eq!(weather.description.as_deref(), Some("clear sky"));
    assert_eq!(weather.raw["main"]["humidity"], 60);
}

#[tokio::test]
async fn current_by_coordinates_sends_lat_lon() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("lat", "51.5"))
        .and(query_param("lon", "-0.12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body("City of London")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let coords = Coordinates::new(51.5, -0.12).expect("finite");
    let weather = client.fetch_current_by_coordinates(coords).await.expect("success");

    assert_eq!(weather.location_name, "City of London");
}

#[tokio::test]
async fn forecast_by_city_keeps_provider_order() {
    let mock_server = MockServer::start().await;
    let response = ResponseTemplate::new(200).set_body_json(forecast_body());
    mount(&mock_server, "/forecast", response).await;

    let client = create_test_client(&mock_server);
    let forecast = client.fetch_forecast_by_city(&london()).await.expect("success");

    assert_eq!(forecast.location_name, "London");
    let icons: Vec<&str> = forecast.entries.iter().map(|e| e.icon.as_str()).collect();
    assert_eq!(icons, vec!["02d", "03n", "04n"]);
    assert_eq!(forecast.entries[2].description.as_deref(), Some("broken clouds"));
}

#[tokio::test]
async fn forecast_by_coordinates() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/forecast"))
        .and(query_param("lat", "-33.87"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let coords = Coordinates::new(-33.87, 151.21).expect("finite");
    let forecast = client.fetch_forecast_by_coordinates(coords).await.expect("success");

    assert_eq!(forecast.len(), 3);
}

// ============================================================================
// Error scenarios
// ============================================================================

#[tokio::test]
async fn unauthorized_status() {
    let mock_server = MockServer::start().await;
    mount(
        &mock_server,
        "/weather",
        ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "cod": 401,
            "message": "Invalid API key."
        })),
    )
    .await;

    let client = create_test_client(&mock_server);
    let result = client.fetch_current_by_city(&london()).await;

    assert_eq!(result.unwrap_err(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn not_found_status() {
    let mock_server = MockServer::start().await;
    mount(
        &mock_server,
        "/forecast",
        ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "cod": "404",
            "message": "city not found"
        })),
    )
    .await;

    let client = create_test_client(&mock_server);
    let result = client.fetch_forecast_by_city(&london()).await;

    assert_eq!(result.unwrap_err(), ErrorKind::NotFound);
}

#[tokio::test]
async fn rate_limited_status() {
    let mock_server = MockServer::start().await;
    mount(&mock_server, "/weather", ResponseTemplate::new(429)).await;

    let client = create_test_client(&mock_server);
    let result = client.fetch_current_by_city(&london()).await;

    assert_eq!(result.unwrap_err(), ErrorKind::RateLimited);
}

#[tokio::test]
async fn server_error_is_transport() {
    let mock_server = MockServer::start().await;
    mount(&mock_server, "/weather", ResponseTemplate::new(503)).await;

    let client = create_test_client(&mock_server);
    let result = client.fetch_current_by_city(&london()).await;

    assert_eq!(result.unwrap_err(), ErrorKind::Transport);
}

#[tokio::test]
async fn malformed_body_with_200_is_parse_error() {
    let mock_server = MockServer::start().await;
    let response = ResponseTemplate::new(200).set_body_string("not json {{{");
    mount(&mock_server, "/weather", response).await;

    let client = create_test_client(&mock_server);
    let result = client.fetch_current_by_city(&london()).await;

    assert_eq!(result.unwrap_err(), ErrorKind::ParseError);
}

#[tokio::test]
async fn unexpected_shape_is_parse_error() {
    let mock_server = MockServer::start().await;
    mount(
        &mock_server,
        "/weather",
        ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({"name": "London", "weather": []})),
    )
    .await;

    let client = create_test_client(&mock_server);
    let result = client.fetch_current_by_city(&london()).await;

    assert_eq!(result.unwrap_err(), ErrorKind::ParseError);
}

#[tokio::test]
async fn slow_response_times_out_as_transport() {
    let mock_server = MockServer::start().await;
    mount(
        &mock_server,
        "/weather",
        ResponseTemplate::new(200)
            .set_body_json(current_body("London"))
            .set_delay(Duration::from_secs(5)),
    )
    .await;

    let config = Config { timeout_secs: 1, ..config_for(&mock_server) };
    let client = OpenWeatherClient::new(&config).expect("Failed to create client");

    let started = Instant::now();
    let result = client.fetch_current_by_city(&london()).await;

    assert_eq!(result.unwrap_err(), ErrorKind::Transport);
    assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
}

#[tokio::test]
async fn connection_refused_is_transport() {
    // Bind then drop: the port stays unused for the rest of the test.
    let addr = TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .expect("free local port");

    let config = Config { api_base_url: format!("http://{addr}"), ..Config::default() };
    let client = OpenWeatherClient::new(&config).expect("Failed to create client");
    let result = client.fetch_current_by_city(&london()).await;

    assert_eq!(result.unwrap_err(), ErrorKind::Transport);
}

/// Serve one response whose body is shorter than its `Content-Length`, then hang up.
fn truncated_body_server(status_line: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind local port");
    let addr = listener.local_addr().expect("local addr");

    thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        let response = format!(
            "{status_line}\r\nContent-Type: application/json\r\n\
             Content-Length: 200\r\nConnection: close\r\n\r\n{{\"cod\":"
        );
        let _ = stream.write_all(response.as_bytes());
        let _ = stream.flush();
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn error_status_wins_over_unreadable_body() {
    let base_url = truncated_body_server("HTTP/1.1 401 Unauthorized");
    let config = Config { api_base_url: base_url, ..Config::default() };
    let client = OpenWeatherClient::new(&config).expect("Failed to create client");

    let result = client.fetch_current_by_city(&london()).await;

    assert_eq!(result.unwrap_err(), ErrorKind::Unauthorized);
}

// ============================================================================
// Store over HTTP
// ============================================================================

fn labels(states: &Mutex<Vec<String>>) -> Vec<String> {
    states.lock().clone()
}

#[tokio::test]
async fn store_reports_success_and_failure_per_slot() {
    let mock_server = MockServer::start().await;
    let response = ResponseTemplate::new(200).set_body_json(current_body("London"));
    mount(&mock_server, "/weather", response).await;
    mount(&mock_server, "/forecast", ResponseTemplate::new(401)).await;

    let client = Arc::new(create_test_client(&mock_server));
    let store = WeatherStateStore::new(client);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = store.subscribe_current(Source::City, move |state| {
        let label = match state {
            QueryState::Idle => "idle".to_string(),
            QueryState::Loading => "loading".to_string(),
            QueryState::Success(w) => format!("success:{}", w.location_name),
            QueryState::Failure(kind) => format!("failure:{kind:?}"),
        };
        sink.lock().push(label);
    });

    store.search_city("London").await;

    assert_eq!(labels(&seen), vec!["idle", "loading", "success:London"]);
    assert_eq!(store.forecast_state(Source::City).error(), Some(ErrorKind::Unauthorized));
}

#[tokio::test]
async fn store_rejects_blank_city_without_request() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body("London")))
        .expect(0)
        .mount(&mock_server)
        .await;

    let store = WeatherStateStore::new(Arc::new(create_test_client(&mock_server)));
    store.request_current_by_city("   ").await;

    assert_eq!(store.current_state(Source::City).error(), Some(ErrorKind::InvalidInput));
}

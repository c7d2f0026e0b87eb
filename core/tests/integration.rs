//! End-to-end tests of the real transport against the live mock server.
//!
//! # Design
//! Every test starts its own mock server on a random port, on a background
//! thread with its own runtime, then drives an `ApiClient` over real HTTP.
//! Results are awaited through `Call::outcome`, which waits for delivery, so
//! these tests observe exactly what an application callback would.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use mock_server::{Echo, UploadSummary, User};
use parking_lot::Mutex;
use restcall_core::{
    mime, ApiClient, ApiError, Call, Config, Lifetime, MockResponse, MultiPart, Nothing, Observer,
    Request,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

async fn result<T: Send + 'static>(call: Call<T>) -> Result<T, ApiError> {
    timeout(Duration::from_secs(10), call.outcome())
        .await
        .expect("call did not settle")
        .into_result()
        .expect("call was canceled")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn search_unwraps_envelope() {
    let client = ApiClient::new(Config::new(start_server())).unwrap();
    let search = Request::get("/search/users")
        .with_parameter("q", "o")
        .with_response_key_path("items");

    let users: Vec<User> = result(client.request(&search)).await.unwrap();
    let logins: Vec<_> = users.iter().map(|u| u.login.as_str()).collect();
    assert_eq!(logins, vec!["hubot", "monalisa", "octocat"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mock_and_real_decode_identically() {
    let base_url = start_server();
    let fixture = r#"{"total_count": 1, "items": [{"id": 1, "login": "octocat", "site_admin": true}]}"#;
    let search = Request::get("/search/users")
        .with_parameter("q", "octo")
        .with_response_key_path("items")
        .with_mock(MockResponse::inline(fixture));

    let real = ApiClient::new(Config::new(base_url.clone())).unwrap();
    let mocked = ApiClient::new(Config::new(base_url).mock_enabled(true)).unwrap();

    let mut threads = Vec::new();
    let mut values = Vec::new();
    for client in [&real, &mocked] {
        let (tx, mut rx) = mpsc::unbounded_channel();
        client.request::<Vec<User>, _>(&search).observe(Observer::new().on_success(
            move |users| {
                let name = thread::current().name().map(str::to_string);
                tx.send((name, users)).unwrap();
            },
        ));
        let (name, users) = timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap();
        threads.push(name);
        values.push(users);
    }

    assert_eq!(values[0], values[1]);
    assert_eq!(threads[0], threads[1]);
    assert_eq!(threads[0].as_deref(), Some("restcall-delivery"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn defaults_are_merged_into_query_and_headers() {
    let client = ApiClient::new(
        Config::new(start_server())
            .default_parameter("per_page", 10)
            .default_header("X-Client", "restcall")
            .default_header("Accept", "application/json"),
    )
    .unwrap();

    let plain: Echo = result(client.request(&Request::get("/echo").with_parameter("q", "rust")))
        .await
        .unwrap();
    assert_eq!(plain.method, "GET");
    assert_eq!(
        plain.query,
        vec![
            ("per_page".to_string(), "10".to_string()),
            ("q".to_string(), "rust".to_string()),
        ]
    );
    assert_eq!(plain.headers["x-client"], "restcall");
    assert_eq!(plain.headers["accept"], "application/json");

    let overridden: Echo = result(client.request(
        &Request::get("/echo")
            .with_parameter("per_page", 50)
            .with_header("x-client", "override"),
    ))
    .await
    .unwrap();
    assert_eq!(overridden.query, vec![("per_page".to_string(), "50".to_string())]);
    assert_eq!(overridden.headers["x-client"], "override");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_get_sends_json_body() {
    let client = ApiClient::new(Config::new(start_server()).default_parameter("source", "test"))
        .unwrap();

    let echo: Echo = result(client.request(
        &Request::post("/echo")
            .with_parameter("name", "restcall")
            .with_parameter("tags", serde_json::json!(["http", "rust"])),
    ))
    .await
    .unwrap();
    assert_eq!(echo.method, "POST");
    assert!(echo.query.is_empty());
    assert_eq!(echo.headers["content-type"], "application/json");
    assert_eq!(
        echo.json,
        serde_json::json!({"name": "restcall", "source": "test", "tags": ["http", "rust"]})
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn absolute_path_bypasses_base_url() {
    let base_url = start_server();
    let client = ApiClient::new(Config::new("http://127.0.0.1:1")).unwrap();
    let user: User = result(client.request(&Request::get(format!("{base_url}/users/hubot"))))
        .await
        .unwrap();
    assert_eq!(user.login, "hubot");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn statuses_are_classified_with_message() {
    let hooked: Arc<Mutex<Vec<ApiError>>> = Arc::default();
    let sink = hooked.clone();
    let client = ApiClient::new(
        Config::new(start_server())
            .error_message_key_path("message")
            .error_hook(move |err| sink.lock().push(err.clone())),
    )
    .unwrap();

    let not_found = result::<User>(client.request(&Request::get("/users/nobody")))
        .await
        .unwrap_err();
    assert!(matches!(
        &not_found,
        ApiError::Client { code: 404, message } if message == "Not Found"
    ));

    let unauthorized = result::<Nothing>(client.request(&Request::delete("/users/hubot")))
        .await
        .unwrap_err();
    assert!(matches!(
        &unauthorized,
        ApiError::Authentication { code: 401, message } if message == "Requires authentication"
    ));

    let unavailable = result::<Nothing>(client.request(&Request::get("/status/503")))
        .await
        .unwrap_err();
    assert!(matches!(
        &unavailable,
        ApiError::Server { code: 503, message } if message == "Service Unavailable"
    ));

    let hooked = hooked.lock();
    let codes: Vec<_> = hooked.iter().map(ApiError::status_code).collect();
    assert_eq!(codes, vec![Some(404), Some(401), Some(503)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn message_is_empty_without_key_path() {
    let client = ApiClient::new(Config::new(start_server())).unwrap();
    let err = result::<Nothing>(client.request(&Request::get("/status/400")))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Client { code: 400, ref message } if message.is_empty()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delete_with_no_content_decodes_nothing() {
    let client = ApiClient::new(Config::new(start_server())).unwrap();
    let delete = Request::delete("/users/hubot").with_header("Authorization", "token abc");
    assert_eq!(result::<Nothing>(client.request(&delete)).await.unwrap(), Nothing);

    let gone = result::<User>(client.request(&Request::get("/users/hubot")))
        .await
        .unwrap_err();
    assert_eq!(gone.status_code(), Some(404));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn multipart_upload_sends_parts_and_fields() {
    let client = ApiClient::new(Config::new(start_server()).default_parameter("album", "pets"))
        .unwrap();
    let upload = Request::post("/upload")
        .with_part(MultiPart::new(&b"PNGDATA"[..], "image", "cat.png", mime::IMAGE_PNG))
        .with_parameter("caption", "a cat")
        .with_parameter("count", 2);

    let summary: UploadSummary = result(client.request(&upload)).await.unwrap();
    assert_eq!(summary.files.len(), 1);
    assert_eq!(summary.files[0].name, "image");
    assert_eq!(summary.files[0].filename.as_deref(), Some("cat.png"));
    assert_eq!(summary.files[0].content_type.as_deref(), Some("image/png"));
    assert_eq!(summary.files[0].size, 7);
    assert_eq!(summary.fields["caption"], "a cat");
    assert_eq!(summary.fields["count"], "2");
    assert_eq!(summary.fields["album"], "pets");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn log_hook_sees_every_exchange() {
    let logged: Arc<Mutex<Vec<(String, Option<u16>, usize)>>> = Arc::default();
    let sink = logged.clone();
    let client = ApiClient::new(Config::new(start_server()).log_hook(move |request, response| {
        sink.lock().push((
            format!("{} {}", request.method, request.url),
            response.status,
            response.body.len(),
        ));
    }))
    .unwrap();

    result::<User>(client.request(&Request::get("/users/octocat")))
        .await
        .unwrap();
    let _ = result::<User>(client.request(&Request::get("/users/nobody"))).await;

    let logged = logged.lock();
    assert_eq!(logged.len(), 2);
    assert!(logged[0].0.starts_with("GET http://") && logged[0].0.ends_with("/users/octocat"));
    assert_eq!(logged[0].1, Some(200));
    assert!(logged[0].2 > 0);
    assert_eq!(logged[1].1, Some(404));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_aborts_in_flight_request() {
    let logged = Arc::new(Mutex::new(0usize));
    let sink = logged.clone();
    let client = ApiClient::new(
        Config::new(start_server()).log_hook(move |_, _| *sink.lock() += 1),
    )
    .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (on_success, on_error, on_end) = (tx.clone(), tx.clone(), tx);
    let handle = client
        .request::<serde_json::Value, _>(&Request::get("/slow").with_parameter("ms", 5_000))
        .observe(
            Observer::new()
                .on_success(move |_| on_success.send("success").unwrap())
                .on_error(move |_| on_error.send("error").unwrap())
                .on_end(move || on_end.send("end").unwrap()),
        );

    tokio::time::sleep(Duration::from_millis(100)).await;
    let started = Instant::now();
    handle.cancel();
    assert!(handle.is_canceled());

    assert_eq!(timeout(Duration::from_secs(2), rx.recv()).await.unwrap(), Some("end"));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(timeout(Duration::from_millis(300), rx.recv()).await.is_err());
    assert_eq!(*logged.lock(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lifetime_end_cancels_request() {
    let client = ApiClient::new(Config::new(start_server())).unwrap();
    let lifetime = Lifetime::new();
    let call = client
        .request::<serde_json::Value, _>(&Request::get("/slow").with_parameter("ms", 5_000))
        .cancel_when(lifetime.signal());

    let pending = tokio::spawn(async move { call.outcome().await.is_canceled() });
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(lifetime);
    assert!(timeout(Duration::from_secs(2), pending).await.unwrap().unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timeout_is_uncategorized() {
    let client = ApiClient::new(Config::new(start_server()).timeout(Duration::from_millis(200)))
        .unwrap();
    let err = result::<serde_json::Value>(
        client.request(&Request::get("/slow").with_parameter("ms", 2_000)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Uncategorized(Some(_))), "got {err:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn retry_reissues_the_request() {
    let client = ApiClient::new(Config::new(start_server())).unwrap();

    let recovered: serde_json::Value = result(
        client
            .request(&Request::get("/flaky/a").with_parameter("fail", 2))
            .retry(Duration::from_millis(10), 2),
    )
    .await
    .unwrap();
    assert_eq!(recovered["attempts"], 3);

    let exhausted = result::<serde_json::Value>(
        client
            .request(&Request::get("/flaky/b").with_parameter("fail", 5))
            .retry(Duration::from_millis(10), 2),
    )
    .await
    .unwrap_err();
    assert!(matches!(exhausted, ApiError::Server { code: 503, .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn then_and_all_chain_real_requests() {
    let client = ApiClient::new(Config::new(start_server())).unwrap();

    let follow_up = client.clone();
    let first_admin = client
        .request::<Vec<User>, _>(&Request::get("/search/users").with_response_key_path("items"))
        .then(move |users| {
            let admin = users.into_iter().find(|u| u.site_admin).map(|u| u.login);
            follow_up.request::<User, _>(&Request::get(format!(
                "/users/{}",
                admin.unwrap_or_default()
            )))
        });
    assert_eq!(result(first_admin).await.unwrap().login, "octocat");

    let calls = ["monalisa", "octocat"]
        .iter()
        .map(|login| client.request::<User, _>(&Request::get(format!("/users/{login}"))))
        .collect();
    let users = result(client.all(calls)).await.unwrap();
    assert_eq!(users[0].login, "monalisa");
    assert_eq!(users[1].login, "octocat");

    let failing = vec![
        client.request::<User, _>(&Request::get("/users/octocat")),
        client.request::<User, _>(&Request::get("/users/nobody")),
    ];
    let err = result(client.all(failing)).await.unwrap_err();
    assert_eq!(err.status_code(), Some(404));
}

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use rent_scout::notifier::{Channel, ChannelNotifier, Notifier, TwilioChannel, WhatsAppChannel};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
struct Captured {
    path: &'static str,
    authorization: Option<String>,
    body: String,
}

type Inbox = Arc<Mutex<Vec<Captured>>>;

async fn record(inbox: &Inbox, path: &'static str, headers: HeaderMap, body: String) {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    inbox.lock().unwrap().push(Captured {
        path,
        authorization,
        body,
    });
}

/// Local stand-in for both vendor APIs; `/fail/...` always answers 500.
async fn vendor_stub() -> (String, Inbox) {
    let inbox: Inbox = Arc::default();
    let app = Router::new()
        .route(
            "/wa/PNID/messages",
            post(|State(inbox): State<Inbox>, headers: HeaderMap, body: String| async move {
                record(&inbox, "whatsapp", headers, body).await;
                StatusCode::OK
            }),
        )
        .route(
            "/tw/Accounts/AC123/Messages.json",
            post(|State(inbox): State<Inbox>, headers: HeaderMap, body: String| async move {
                record(&inbox, "twilio", headers, body).await;
                StatusCode::CREATED
            }),
        )
        .route(
            "/fail/PNID/messages",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .with_state(inbox.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), inbox)
}

#[tokio::test]
async fn whatsapp_posts_json_with_bearer_token() {
    let (base, inbox) = vendor_stub().await;
    let channel = WhatsAppChannel::new(reqwest::Client::new(), "PNID", "tok")
        .with_api_base(format!("{base}/wa"));

    let long = "x".repeat(5000);
    channel.send(&long, "+919900000000").await.unwrap();

    let captured = inbox.lock().unwrap().clone();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].authorization.as_deref(), Some("Bearer tok"));
    let payload: serde_json::Value = serde_json::from_str(&captured[0].body).unwrap();
    assert_eq!(payload["messaging_product"], "whatsapp");
    assert_eq!(payload["to"], "+919900000000");
    assert_eq!(payload["type"], "text");
    assert_eq!(payload["text"]["body"].as_str().unwrap().len(), 4096);
}

#[tokio::test]
async fn twilio_posts_form_with_basic_auth() {
    let (base, inbox) = vendor_stub().await;
    let channel = TwilioChannel::new(reqwest::Client::new(), "AC123", "secret", "+15005550006")
        .with_api_base(format!("{base}/tw"));

    channel.send("New 2 BHK", "+919900000000").await.unwrap();

    let captured = inbox.lock().unwrap().clone();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].path, "twilio");
    assert!(captured[0]
        .authorization
        .as_deref()
        .unwrap()
        .starts_with("Basic "));
    let form: Vec<(String, String)> = url::form_urlencoded::parse(captured[0].body.as_bytes())
        .into_owned()
        .collect();
    assert!(form.contains(&("From".to_string(), "+15005550006".to_string())));
    assert!(form.contains(&("To".to_string(), "+919900000000".to_string())));
    assert!(form.contains(&("Body".to_string(), "New 2 BHK".to_string())));
}

#[tokio::test]
async fn vendor_error_falls_back_to_next_channel() {
    let (base, inbox) = vendor_stub().await;
    let client = reqwest::Client::new();
    let channels: Vec<Box<dyn Channel>> = vec![
        Box::new(WhatsAppChannel::new(client.clone(), "PNID", "tok").with_api_base(format!("{base}/fail"))),
        Box::new(
            TwilioChannel::new(client, "AC123", "secret", "+15005550006")
                .with_api_base(format!("{base}/tw")),
        ),
    ];
    let notifier = ChannelNotifier::new(&["WHATSAPP".to_string(), "SMS".to_string()], channels);

    assert!(notifier.send("hello", "+919900000000").await);
    let captured = inbox.lock().unwrap().clone();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].path, "twilio");
}

#[tokio::test]
async fn unreachable_vendor_is_a_failed_send() {
    let channel = WhatsAppChannel::new(reqwest::Client::new(), "PNID", "tok")
        .with_api_base("http://127.0.0.1:9");
    assert!(channel.send("hello", "+919900000000").await.is_err());
}

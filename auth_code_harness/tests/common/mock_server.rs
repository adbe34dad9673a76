//! Axum-based mock of every collaborator of the harness
//!
//! One server plays the registration API (`/clients`), the authorization server with its login
//! and consent pages (`/{oauth2,openid}/auth`, `/login`, `/consent`) and the relying party
//! (`/{oauth2,openid}/callback`, introspection, revocation, userinfo). Each test starts its own
//! instance on an ephemeral port.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use axum::{
    Router,
    extract::{Form, Path, Query, State},
    http::{HeaderMap, StatusCode, Uri, header},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use uuid::Uuid;

pub const TEST_USER: &str = "foo@bar.com";
pub const TEST_PASSWORD: &str = "foobar";
pub const ID_TOKEN_SECRET: &[u8] = b"mock-id-token-signing-secret";
const SESSION_COOKIE: &str = "rp_session";
const LOGIN_COOKIE: &str = "as_login";

/// What the registration endpoint puts in `client_id`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RegistrationReply {
    #[default]
    Issued,
    WithoutClientId,
    EmptyClientId,
}

/// Knobs for exercising failure paths
#[derive(Clone, Debug, Default)]
pub struct MockBehavior {
    /// The consent page answers every submission with `access_denied`
    pub deny_consent: bool,
    /// The relying party callback waits this long before answering
    pub callback_delay: Option<Duration>,
    pub registration_reply: RegistrationReply,
    /// The authorization endpoint redirects to itself forever
    pub redirect_loop: bool,
}

#[derive(Clone, Debug)]
pub struct MockClient {
    pub scope: HashSet<String>,
    pub redirect_uris: Vec<String>,
}

#[derive(Clone, Debug)]
struct PendingAuth {
    client_id: String,
    scope: Vec<String>,
    redirect_uri: String,
    state: String,
    subject: Option<String>,
    granted: Vec<String>,
    /// `prompt=consent`: ignore a remembered consent
    force_consent: bool,
}

#[derive(Clone, Debug)]
struct TokenRecord {
    token_use: &'static str,
    subject: String,
    client_id: String,
    active: bool,
}

#[derive(Clone, Debug)]
struct RpSession {
    access_token: String,
    refresh_token: Option<String>,
}

#[derive(Default)]
struct MockData {
    clients: HashMap<String, MockClient>,
    challenges: HashMap<String, PendingAuth>,
    codes: HashMap<String, PendingAuth>,
    sessions: HashMap<String, RpSession>,
    tokens: HashMap<String, TokenRecord>,
    /// Remembered logins, by `as_login` cookie value
    login_sessions: HashMap<String, String>,
    /// Remembered grants, by (subject, client id)
    remembered_consents: HashMap<(String, String), Vec<String>>,
    login_views: usize,
    consent_views: usize,
}

/// Shared state for the mock server
#[derive(Clone, Default)]
pub struct MockState {
    data: Arc<Mutex<MockData>>,
    behavior: MockBehavior,
}

pub struct MockServer {
    pub base_url: String,
    state: MockState,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> Self {
        Self::start_with(MockBehavior::default()).await
    }

    pub async fn start_with(behavior: MockBehavior) -> Self {
        let state = MockState {
            data: Arc::default(),
            behavior,
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock server");
        let addr = listener.local_addr().expect("Mock server has an address");
        let app = create_mock_app(state.clone());

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                println!("❌ Mock server error: {e}");
            }
        });
        println!("🔧 Mock collaborators listening on {addr}");

        Self {
            base_url: format!("http://{addr}"),
            state,
            handle,
        }
    }

    /// Clients registered so far, by client id
    pub fn registered_clients(&self) -> HashMap<String, MockClient> {
        self.state.data.lock().unwrap().clients.clone()
    }

    /// Whether the token is known and still active
    pub fn token_active(&self, token: &str) -> Option<bool> {
        self.state
            .data
            .lock()
            .unwrap()
            .tokens
            .get(token)
            .map(|t| t.active)
    }

    /// How often the login and consent pages were rendered
    pub fn page_views(&self) -> (usize, usize) {
        let data = self.state.data.lock().unwrap();
        (data.login_views, data.consent_views)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn create_mock_app(state: MockState) -> Router {
    Router::new()
        .route("/clients", post(register_client))
        .route("/oauth2/auth", get(authorize))
        .route("/openid/auth", get(authorize))
        .route("/loop", get(|| async { Redirect::to("/loop") }))
        .route("/login", get(login_page).post(login_submit))
        .route("/consent", get(consent_page).post(consent_submit))
        .route("/oauth2/callback", get(callback))
        .route("/openid/callback", get(callback))
        .route("/oauth2/introspect/{kind}", get(introspect))
        .route("/openid/revoke/{kind}", get(revoke))
        .route("/openid/userinfo", get(userinfo))
        .with_state(state)
}

async fn register_client(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    let redirect_uris: Vec<String> = body["redirect_uris"]
        .as_array()
        .map(|uris| {
            uris.iter()
                .filter_map(|u| u.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    if redirect_uris.is_empty() || redirect_uris.iter().any(|u| u.contains('#')) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_redirect_uri",
                "error_description": "Redirect URIs must be absolute and must not contain a fragment"
            })),
        )
            .into_response();
    }
    if body["client_secret"].as_str().is_none_or(|s| s.len() < 6) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_client_metadata"})),
        )
            .into_response();
    }

    let client_id = Uuid::new_v4().to_string();
    let scope = body["scope"]
        .as_str()
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    state.data.lock().unwrap().clients.insert(
        client_id.clone(),
        MockClient {
            scope,
            redirect_uris: redirect_uris.clone(),
        },
    );

    let mut response = body;
    match state.behavior.registration_reply {
        RegistrationReply::Issued => response["client_id"] = json!(client_id),
        RegistrationReply::EmptyClientId => response["client_id"] = json!(""),
        RegistrationReply::WithoutClientId => {}
    }
    (StatusCode::CREATED, Json(response)).into_response()
}

async fn authorize(
    State(state): State<MockState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if state.behavior.redirect_loop {
        return Redirect::to("/loop").into_response();
    }
    let param = |name: &str| params.get(name).cloned().unwrap_or_default();
    let client_id = param("client_id");
    let redirect_uri = param("redirect_uri");
    let scope: Vec<String> = param("scope")
        .split_whitespace()
        .map(str::to_string)
        .collect();

    let mut data = state.data.lock().unwrap();
    let Some(client) = data.clients.get(&client_id) else {
        return Redirect::to("/error?error=invalid_client&error_description=Unknown+client")
            .into_response();
    };
    if !client.redirect_uris.contains(&redirect_uri) {
        return Redirect::to("/error?error=invalid_request&error_description=Unregistered+redirect_uri")
            .into_response();
    }
    if param("response_type") != "code" || !scope.iter().all(|s| client.scope.contains(s)) {
        return error_redirect(
            &redirect_uri,
            "invalid_scope",
            "The requested scope is not allowed for this client",
            &param("state"),
        );
    }

    let prompt = param("prompt");
    let prompted = |value: &str| prompt.split_whitespace().any(|p| p == value);
    let subject = if prompted("login") {
        None
    } else {
        cookie(&headers, LOGIN_COOKIE).and_then(|id| data.login_sessions.get(id).cloned())
    };

    let challenge = Uuid::new_v4().simple().to_string();
    let pending = PendingAuth {
        client_id,
        scope,
        redirect_uri,
        state: param("state"),
        subject,
        granted: Vec::new(),
        force_consent: prompted("consent"),
    };
    if pending.subject.is_some() {
        return after_login(&mut data, challenge, pending);
    }
    data.challenges.insert(challenge.clone(), pending);
    Redirect::to(&format!("/login?login_challenge={challenge}")).into_response()
}

/// Skips the consent page when the subject remembered a grant for this client
fn after_login(data: &mut MockData, challenge: String, mut pending: PendingAuth) -> Response {
    let key = (
        pending.subject.clone().unwrap_or_default(),
        pending.client_id.clone(),
    );
    match data.remembered_consents.get(&key).cloned() {
        Some(granted) if !pending.force_consent => {
            pending.granted = granted
                .into_iter()
                .filter(|s| pending.scope.contains(s))
                .collect();
            issue_code(data, pending)
        }
        _ => {
            data.challenges.insert(challenge.clone(), pending);
            Redirect::to(&format!("/consent?consent_challenge={challenge}")).into_response()
        }
    }
}

fn issue_code(data: &mut MockData, pending: PendingAuth) -> Response {
    let code = Uuid::new_v4().simple().to_string();
    let location = with_query(
        &pending.redirect_uri,
        &[("code", code.as_str()), ("state", pending.state.as_str())],
    );
    data.codes.insert(code, pending);
    Redirect::to(&location).into_response()
}

async fn login_page(
    State(state): State<MockState>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<String> {
    state.data.lock().unwrap().login_views += 1;
    let challenge = params.get("login_challenge").cloned().unwrap_or_default();
    Html(render_login(&challenge, None))
}

fn render_login(challenge: &str, error: Option<&str>) -> String {
    let error = error
        .map(|e| format!(r#"<p class="error">{e}</p>"#))
        .unwrap_or_default();
    format!(
        r#"<!doctype html>
<html><head><title>Please log in</title></head><body>
  <h1 id="login-title">Please log in</h1>
  {error}
  <form action="/login" method="POST">
    <input type="hidden" name="_csrf" value="csrf-{challenge}">
    <input type="hidden" name="challenge" value="{challenge}">
    <table style="">
      <tr><td><input type="email" id="email" name="email" placeholder="email@foobar.com"></td>
          <td>(it's "foo@bar.com")</td></tr>
      <tr><td><input type="password" id="password" name="password"></td>
          <td>(it's "foobar")</td></tr>
    </table>
    <input type="checkbox" id="remember" name="remember" value="1"><label for="remember">Remember me</label><br>
    <input type="submit" id="accept" name="submit" value="Log in">
    <input type="submit" id="reject" name="submit" value="Deny access">
  </form>
</body></html>"#
    )
}

async fn login_submit(
    State(state): State<MockState>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Response {
    let field = |name: &str| {
        fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    };
    let challenge = field("challenge");
    if field("_csrf") != format!("csrf-{challenge}") {
        return (StatusCode::FORBIDDEN, "invalid csrf token").into_response();
    }

    let mut data = state.data.lock().unwrap();
    let Some(pending) = data.challenges.get(&challenge) else {
        return (StatusCode::NOT_FOUND, "unknown login challenge").into_response();
    };
    if field("submit") == "Deny access" {
        return error_redirect(
            &pending.redirect_uri,
            "access_denied",
            "The resource owner denied the request",
            &pending.state,
        );
    }
    if field("email") != TEST_USER || field("password") != TEST_PASSWORD {
        return Html(render_login(
            &challenge,
            Some("The username / password combination is not correct"),
        ))
        .into_response();
    }

    let Some(mut pending) = data.challenges.remove(&challenge) else {
        return (StatusCode::NOT_FOUND, "unknown login challenge").into_response();
    };
    let subject = field("email");
    pending.subject = Some(subject.clone());
    let response = after_login(&mut data, challenge, pending);
    if field("remember") != "1" {
        return response;
    }

    let login_id = Uuid::new_v4().to_string();
    data.login_sessions.insert(login_id.clone(), subject);
    let login_cookie = format!("{LOGIN_COOKIE}={login_id}; Path=/; HttpOnly");
    ([(header::SET_COOKIE, login_cookie)], response).into_response()
}

async fn consent_page(
    State(state): State<MockState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let challenge = params.get("consent_challenge").cloned().unwrap_or_default();
    let mut data = state.data.lock().unwrap();
    data.consent_views += 1;
    let Some(pending) = data.challenges.get(&challenge) else {
        return (StatusCode::NOT_FOUND, "unknown consent challenge").into_response();
    };

    let checkboxes: String = pending
        .scope
        .iter()
        .map(|scope| {
            format!(
                r#"    <input type="checkbox" class="grant_scope" id="{scope}" value="{scope}" name="grant_scope" checked>
    <label for="{scope}">{scope}</label><br>
"#
            )
        })
        .collect();

    Html(format!(
        r#"<!doctype html>
<html><head><title>An application requests access to your data!</title></head><body>
  <h1>An application requests access to your data!</h1>
  <form action="/consent" method="POST">
    <input type="hidden" name="challenge" value="{challenge}">
    <input type="hidden" name="_csrf" value="csrf-{challenge}">
    <p>Hi {subject}, application <strong>{client}</strong> wants access resources on your behalf and to:</p>
{checkboxes}
    <p>Do you want to be asked next time when this application wants to access your data?</p>
    <input type="checkbox" id="remember" name="remember" value="1"><label for="remember">do not ask me again</label><br>
    <input type="submit" id="accept" name="submit" value="Allow access">
    <input type="submit" id="reject" name="submit" value="Deny access">
  </form>
</body></html>"#,
        subject = pending.subject.as_deref().unwrap_or("stranger"),
        client = pending.client_id,
    ))
    .into_response()
}

async fn consent_submit(
    State(state): State<MockState>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Response {
    let challenge = fields
        .iter()
        .find(|(k, _)| k == "challenge")
        .map(|(_, v)| v.clone())
        .unwrap_or_default();

    let mut data = state.data.lock().unwrap();
    let Some(mut pending) = data.challenges.remove(&challenge) else {
        return (StatusCode::NOT_FOUND, "unknown consent challenge").into_response();
    };
    if pending.subject.is_none() {
        return (StatusCode::FORBIDDEN, "consent before login").into_response();
    }

    let denied = fields
        .iter()
        .any(|(k, v)| k == "submit" && v == "Deny access");
    if state.behavior.deny_consent || denied {
        return error_redirect(
            &pending.redirect_uri,
            "access_denied",
            "The resource owner denied the request",
            &pending.state,
        );
    }

    pending.granted = fields
        .iter()
        .filter(|(k, _)| k == "grant_scope")
        .map(|(_, v)| v.clone())
        .filter(|s| pending.scope.contains(s))
        .collect();

    if fields.iter().any(|(k, v)| k == "remember" && v == "1") {
        let key = (
            pending.subject.clone().unwrap_or_default(),
            pending.client_id.clone(),
        );
        data.remembered_consents.insert(key, pending.granted.clone());
    }
    issue_code(&mut data, pending)
}

/// Exchanges the code like a relying party would and renders the outcome as page content.
/// The oauth2 callback answers with raw JSON, the openid callback wraps it in HTML.
async fn callback(
    State(state): State<MockState>,
    uri: Uri,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Some(delay) = state.behavior.callback_delay {
        tokio::time::sleep(delay).await;
    }
    let as_html = uri.path().starts_with("/openid");

    if let Some(error) = params.get("error") {
        let payload = json!({
            "result": "error",
            "error": error,
            "error_description": params.get("error_description").cloned().unwrap_or_default(),
        });
        return render_payload(&payload, as_html, None);
    }

    let code = params.get("code").cloned().unwrap_or_default();
    let mut data = state.data.lock().unwrap();
    let Some(grant) = data.codes.remove(&code) else {
        let payload = json!({"result": "error", "error": "invalid_grant"});
        return render_payload(&payload, as_html, None);
    };
    let subject = grant.subject.clone().unwrap_or_default();
    let granted = |scope: &str| grant.granted.iter().any(|s| s == scope);

    let access_token = format!("ory_at_{}", Uuid::new_v4().simple());
    let refresh_token = granted("offline_access").then(|| format!("ory_rt_{}", Uuid::new_v4().simple()));
    let id_token = granted("openid").then(|| mint_id_token(&subject, &grant.client_id));

    data.tokens.insert(
        access_token.clone(),
        TokenRecord {
            token_use: "access_token",
            subject: subject.clone(),
            client_id: grant.client_id.clone(),
            active: true,
        },
    );
    if let Some(refresh_token) = &refresh_token {
        data.tokens.insert(
            refresh_token.clone(),
            TokenRecord {
                token_use: "refresh_token",
                subject: subject.clone(),
                client_id: grant.client_id.clone(),
                active: true,
            },
        );
    }

    let session_id = Uuid::new_v4().to_string();
    data.sessions.insert(
        session_id.clone(),
        RpSession {
            access_token: access_token.clone(),
            refresh_token: refresh_token.clone(),
        },
    );

    let mut token = json!({
        "access_token": access_token,
        "token_type": "bearer",
        "expires_in": 3599,
        "scope": grant.granted.join(" "),
    });
    if let Some(id_token) = id_token {
        token["id_token"] = json!(id_token);
    }
    if let Some(refresh_token) = refresh_token {
        token["refresh_token"] = json!(refresh_token);
    }
    render_payload(
        &json!({"result": "success", "token": token}),
        as_html,
        Some(&session_id),
    )
}

fn render_payload(payload: &Value, as_html: bool, session_id: Option<&str>) -> Response {
    let cookie = session_id
        .map(|id| format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly"))
        .unwrap_or_else(|| format!("{SESSION_COOKIE}=; Path=/; Max-Age=0"));

    if as_html {
        let escaped = payload.to_string().replace('&', "&amp;").replace('"', "&quot;");
        let body = format!("<html><head></head><body><pre>{escaped}</pre></body></html>");
        ([(header::SET_COOKIE, cookie)], Html(body)).into_response()
    } else {
        ([(header::SET_COOKIE, cookie)], Json(payload.clone())).into_response()
    }
}

fn mint_id_token(subject: &str, client_id: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let claims = json!({
        "iss": "http://127.0.0.1/",
        "sub": subject,
        "aud": [client_id],
        "iat": now,
        "exp": now + 3600,
        "jti": Uuid::new_v4().to_string(),
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(ID_TOKEN_SECRET),
    )
    .expect("Failed to sign mock id_token")
}

fn cookie<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|c| c.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

fn session<'a>(headers: &HeaderMap, data: &'a MockData) -> Option<&'a RpSession> {
    data.sessions.get(cookie(headers, SESSION_COOKIE)?)
}

fn session_token(session: &RpSession, kind: &str) -> Option<String> {
    match kind {
        "at" => Some(session.access_token.clone()),
        "rt" => session.refresh_token.clone(),
        _ => None,
    }
}

async fn introspect(
    State(state): State<MockState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
) -> Json<Value> {
    let data = state.data.lock().unwrap();
    let record = session(&headers, &data)
        .and_then(|s| session_token(s, &kind))
        .and_then(|token| data.tokens.get(&token));

    match record {
        Some(record) if record.active => Json(json!({
            "result": "success",
            "body": {
                "active": true,
                "client_id": record.client_id,
                "sub": record.subject,
                "token_type": "Bearer",
                "token_use": record.token_use,
            }
        })),
        Some(_) => Json(json!({"result": "success", "body": {"active": false}})),
        None => Json(json!({"result": "error", "error": "No such token in session"})),
    }
}

/// Revoking either token of a session invalidates its access token
async fn revoke(
    State(state): State<MockState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
) -> Json<Value> {
    let mut data = state.data.lock().unwrap();
    let Some(session) = session(&headers, &data).cloned() else {
        return Json(json!({"result": "error", "error": "No session"}));
    };
    let Some(token) = session_token(&session, &kind) else {
        return Json(json!({"result": "error", "error": "No such token in session"}));
    };

    for revoked in [token, session.access_token] {
        if let Some(record) = data.tokens.get_mut(&revoked) {
            record.active = false;
        }
    }
    Json(json!({"result": "success"}))
}

async fn userinfo(State(state): State<MockState>, headers: HeaderMap) -> Response {
    let data = state.data.lock().unwrap();
    let record = session(&headers, &data).and_then(|s| data.tokens.get(&s.access_token));

    match record {
        Some(record) if record.active => Json(json!({
            "sub": record.subject,
            "email": record.subject,
        }))
        .into_response(),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "request_unauthorized",
                "error_description": "The request could not be authorized",
            })),
        )
            .into_response(),
    }
}

fn error_redirect(redirect_uri: &str, error: &str, description: &str, state: &str) -> Response {
    let location = with_query(
        redirect_uri,
        &[
            ("error", error),
            ("error_description", description),
            ("state", state),
        ],
    );
    Redirect::to(&location).into_response()
}

fn with_query(base: &str, pairs: &[(&str, &str)]) -> String {
    let mut url = url::Url::parse(base).expect("redirect URI was validated at registration");
    url.query_pairs_mut().extend_pairs(pairs.iter().copied());
    url.to_string()
}

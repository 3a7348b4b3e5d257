use httpmock::prelude::*;
use portal_sync::adapters::http_browser::HttpBrowserSettings;
use portal_sync::domain::model::{CredentialBundle, ProfileRecord};
use portal_sync::{
    CipherKey, CredentialCipher, DriverSettings, ErrorKind, HttpBrowser, MemoryStore,
    PortalDriver, PortalError, PortalService,
};
use std::sync::Arc;
use std::time::Duration;

const PASSWORD: &str = "hunter2portal";
const SESSION_COOKIE: &str = "HAC_Session=abc123";

const LOGIN_PAGE: &str = r#"<!DOCTYPE html>
<html><body>
  <form action="/HomeAccess/Account/LogOn?ReturnUrl=%2fHomeAccess%2f" method="post">
    <input name="__RequestVerificationToken" type="hidden" value="tok-42" />
    <select id="Database" name="Database">
      <option value="10">North ISD</option>
      <option value="20" selected="selected">South ISD</option>
    </select>
    <input id="LogOnDetails_UserName" name="LogOnDetails.UserName" type="text" />
    <input id="LogOnDetails_Password" name="LogOnDetails.Password" type="password" />
    <button id="login" type="submit">Sign In</button>
  </form>
</body></html>"#;

const REJECTED_PAGE: &str = r#"<html><body>
  <div class="validation-summary-errors"><ul><li>Your attempt to log on was unsuccessful.</li></ul></div>
  <form action="/HomeAccess/Account/LogOn" method="post">
    <input id="LogOnDetails_UserName" name="LogOnDetails.UserName" type="text" />
    <input id="LogOnDetails_Password" name="LogOnDetails.Password" type="password" />
    <button id="login" type="submit">Sign In</button>
  </form>
</body></html>"#;

const WEEK_VIEW: &str = "<html><body><h1>Week View</h1></body></html>";

const AVERAGES_PAGE: &str = r##"<html><body>
  <div class="AssignmentClass">
    <div class="sg-header">
      <a class="sg-header-heading" href="#">3210 - 1  AP Biology</a>
      <span class="sg-header-heading sg-right">Student Grades 94%</span>
    </div>
  </div>
  <div class="AssignmentClass">
    <div class="sg-header">
      <a class="sg-header-heading" href="#">MATH201A - 2 Algebra II</a>
      <span class="sg-header-heading sg-right">Student Grades 88%</span>
    </div>
  </div>
</body></html>"##;

const TRANSCRIPT_PAGE: &str = r#"<html><body>
  <table>
    <tr><td>Weighted GPA</td><td><span id="plnMain_rpTranscriptGroup_lblGPACum1">4.2143</span></td></tr>
    <tr><td>Unweighted GPA</td><td><span id="plnMain_rpTranscriptGroup_lblGPACum2">3.8571</span></td></tr>
    <tr><td>Rank</td><td><span id="plnMain_rpTranscriptGroup_lblGPARank1">12 / 431</span></td></tr>
  </table>
</body></html>"#;

struct PortalMocks<'a> {
    login_page: httpmock::Mock<'a>,
    login_submit: httpmock::Mock<'a>,
    averages: httpmock::Mock<'a>,
    transcript: httpmock::Mock<'a>,
}

fn mock_portal(server: &MockServer) -> PortalMocks<'_> {
    let login_page = server.mock(|when, then| {
        when.method(GET).path("/HomeAccess/Account/LogOn");
        then.status(200)
            .header("Content-Type", "text/html; charset=utf-8")
            .header("Set-Cookie", format!("{}; Path=/", SESSION_COOKIE))
            .body(LOGIN_PAGE);
    });

    let login_submit = server.mock(|when, then| {
        when.method(POST)
            .path("/HomeAccess/Account/LogOn")
            .header("cookie", SESSION_COOKIE)
            .body_contains("__RequestVerificationToken=tok-42")
            .body_contains("Database=20")
            .body_contains("LogOnDetails.UserName=student")
            .body_contains(format!("LogOnDetails.Password={}", PASSWORD));
        then.status(302)
            .header("Location", server.url("/HomeAccess/Home/WeekView"));
    });

    server.mock(|when, then| {
        when.method(GET).path("/HomeAccess/Home/WeekView");
        then.status(200).body(WEEK_VIEW);
    });

    let averages = server.mock(|when, then| {
        when.method(GET)
            .path("/HomeAccess/Content/Student/Assignments.aspx")
            .header("cookie", SESSION_COOKIE);
        then.status(200).body(AVERAGES_PAGE);
    });

    let transcript = server.mock(|when, then| {
        when.method(GET)
            .path("/HomeAccess/Content/Student/Transcript.aspx")
            .header("cookie", SESSION_COOKIE);
        then.status(200).body(TRANSCRIPT_PAGE);
    });

    PortalMocks {
        login_page,
        login_submit,
        averages,
        transcript,
    }
}

fn test_cipher() -> Arc<CredentialCipher> {
    Arc::new(CredentialCipher::new(&CipherKey::generate()))
}

fn connected_profile(
    cipher: &CredentialCipher,
    user_id: &str,
    portal_url: &str,
    password: &str,
) -> ProfileRecord {
    ProfileRecord {
        user_id: user_id.to_string(),
        portal: Some(CredentialBundle {
            portal_url: Some(cipher.encrypt(portal_url).unwrap()),
            username: Some(cipher.encrypt("student").unwrap()),
            password: Some(cipher.encrypt(password).unwrap()),
            connected: true,
        }),
    }
}

fn quick_settings() -> DriverSettings {
    DriverSettings {
        launch_timeout: Duration::from_secs(5),
        navigation_timeout: Duration::from_secs(5),
        submit_timeout: Duration::from_secs(2),
    }
}

fn service(
    store: MemoryStore,
    cipher: Arc<CredentialCipher>,
) -> PortalService<MemoryStore, HttpBrowser> {
    let browser = HttpBrowser::new(HttpBrowserSettings {
        request_timeout: Duration::from_secs(5),
        ..HttpBrowserSettings::default()
    });
    PortalService::new(store, cipher, PortalDriver::new(browser, quick_settings()))
}

#[tokio::test]
async fn test_fetch_averages_end_to_end() {
    let server = MockServer::start();
    let mocks = mock_portal(&server);
    let cipher = test_cipher();
    let store = MemoryStore::with_profiles(vec![connected_profile(
        &cipher,
        "u1",
        &server.base_url(),
        PASSWORD,
    )]);
    let service = service(store, cipher);

    let response = tokio_test::assert_ok!(service.fetch_portal_data("u1", "averages").await);

    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        serde_json::json!({"data": {"AP Biology": "94", "Algebra II": "88"}})
    );
    mocks.login_page.assert();
    mocks.login_submit.assert();
    mocks.averages.assert();
    // Both datasets are scraped in one session regardless of which one was asked for.
    mocks.transcript.assert();
}

#[tokio::test]
async fn test_fetch_transcript_with_rooted_portal_url() {
    let server = MockServer::start();
    let mocks = mock_portal(&server);
    let cipher = test_cipher();
    let store = MemoryStore::with_profiles(vec![connected_profile(
        &cipher,
        "u1",
        &server.url("/HomeAccess/Home/WeekView"),
        PASSWORD,
    )]);
    let service = service(store, cipher);

    let response = tokio_test::assert_ok!(service.fetch_portal_data("u1", "transcript").await);

    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        serde_json::json!({"data": {
            "weighted_gpa": "4.2143",
            "unweighted_gpa": "3.8571",
            "class_rank": "12 / 431"
        }})
    );
    mocks.login_submit.assert();
}

#[tokio::test]
async fn test_rejected_login_is_authentication_failed_without_leaking_password() {
    let server = MockServer::start();
    let mocks = mock_portal(&server);
    let wrong_password = "wrongpass77";
    let rejected = server.mock(|when, then| {
        when.method(POST)
            .path("/HomeAccess/Account/LogOn")
            .body_contains(wrong_password);
        then.status(200).body(REJECTED_PAGE);
    });

    let cipher = test_cipher();
    let store = MemoryStore::with_profiles(vec![connected_profile(
        &cipher,
        "u1",
        &server.base_url(),
        wrong_password,
    )]);
    let service = service(store, cipher);

    let err = tokio_test::assert_err!(service.fetch_portal_data("u1", "averages").await);

    assert!(matches!(err, PortalError::AuthenticationFailed));
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
    assert!(!err.is_retryable());
    assert!(!err.to_string().contains(wrong_password));
    let body = serde_json::to_string(&err.to_response()).unwrap();
    assert!(!body.contains(wrong_password));
    assert!(!body.contains("validation-summary-errors"));

    rejected.assert();
    mocks.averages.assert_hits(0);
    mocks.transcript.assert_hits(0);
}

#[tokio::test]
async fn test_invalid_data_type_never_touches_the_portal() {
    let server = MockServer::start();
    let mocks = mock_portal(&server);
    let cipher = test_cipher();
    let store = MemoryStore::with_profiles(vec![connected_profile(
        &cipher,
        "u1",
        &server.base_url(),
        PASSWORD,
    )]);
    let service = service(store, cipher);

    let err = tokio_test::assert_err!(service.fetch_portal_data("u1", "attendance").await);

    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert_eq!(err.status(), 400);
    mocks.login_page.assert_hits(0);
    mocks.login_submit.assert_hits(0);
}

#[tokio::test]
async fn test_server_error_after_login_is_transient() {
    let server = MockServer::start();
    let login_page = server.mock(|when, then| {
        when.method(GET).path("/HomeAccess/Account/LogOn");
        then.status(200).body(LOGIN_PAGE);
    });
    server.mock(|when, then| {
        when.method(POST).path("/HomeAccess/Account/LogOn");
        then.status(302)
            .header("Location", server.url("/HomeAccess/Home/WeekView"));
    });
    server.mock(|when, then| {
        when.method(GET).path("/HomeAccess/Home/WeekView");
        then.status(200).body(WEEK_VIEW);
    });
    let averages = server.mock(|when, then| {
        when.method(GET)
            .path("/HomeAccess/Content/Student/Assignments.aspx");
        then.status(500).body("<html>Server Error in '/' Application.</html>");
    });

    let cipher = test_cipher();
    let store = MemoryStore::with_profiles(vec![connected_profile(
        &cipher,
        "u1",
        &server.base_url(),
        PASSWORD,
    )]);
    let service = service(store, cipher);

    let err = tokio_test::assert_err!(service.fetch_portal_data("u1", "averages").await);

    assert_eq!(err.kind(), ErrorKind::TransientFailure);
    assert!(err.is_retryable());
    assert_eq!(err.status(), 502);
    assert!(!err.to_string().contains(PASSWORD));
    assert!(!err.to_string().contains("Server Error in"));
    login_page.assert();
    averages.assert();
}

#[tokio::test]
async fn test_unreachable_portal_is_transient() {
    let cipher = test_cipher();
    // Port 9 (discard) is not listening on the test host.
    let store = MemoryStore::with_profiles(vec![connected_profile(
        &cipher,
        "u1",
        "http://127.0.0.1:9",
        PASSWORD,
    )]);
    let service = service(store, cipher);

    let err = tokio_test::assert_err!(service.fetch_portal_data("u1", "transcript").await);

    assert_eq!(err.kind(), ErrorKind::TransientFailure);
}

#[tokio::test]
async fn test_concurrent_fetches_use_independent_sessions() {
    let server = MockServer::start();
    let mocks = mock_portal(&server);
    let cipher = test_cipher();
    let store = MemoryStore::with_profiles(vec![
        connected_profile(&cipher, "u1", &server.base_url(), PASSWORD),
        connected_profile(&cipher, "u2", &server.url("/HomeAccess"), PASSWORD),
    ]);
    let service = service(store, cipher);

    let (averages, transcript) = tokio::join!(
        service.fetch_portal_data("u1", "averages"),
        service.fetch_portal_data("u2", "transcript"),
    );

    let averages = serde_json::to_value(averages.unwrap()).unwrap();
    let transcript = serde_json::to_value(transcript.unwrap()).unwrap();
    assert_eq!(averages["data"]["AP Biology"], "94");
    assert_eq!(transcript["data"]["class_rank"], "12 / 431");
    mocks.login_page.assert_hits(2);
    mocks.login_submit.assert_hits(2);
}

#[tokio::test]
async fn test_get_login_form_failure_keeps_password_out_of_diagnostics() {
    let server = MockServer::start();
    // No method attribute: the browser submits the form as a GET with a query string.
    server.mock(|when, then| {
        when.method(GET).path("/HomeAccess/Account/LogOn");
        then.status(200).body(
            r#"<form action="/HomeAccess/Account/Submit">
                 <input id="LogOnDetails_UserName" name="LogOnDetails.UserName" type="text" />
                 <input id="LogOnDetails_Password" name="LogOnDetails.Password" type="password" />
                 <button id="login" type="submit">Sign In</button>
               </form>"#,
        );
    });
    let submit = server.mock(|when, then| {
        when.method(GET)
            .path("/HomeAccess/Account/Submit")
            .query_param_exists("LogOnDetails.Password");
        then.status(500).body("<html>Server Error</html>");
    });

    let cipher = test_cipher();
    let store = MemoryStore::with_profiles(vec![connected_profile(
        &cipher,
        "u1",
        &server.base_url(),
        "s3cr@t pass!",
    )]);
    let service = service(store, cipher);

    let err = tokio_test::assert_err!(service.fetch_portal_data("u1", "averages").await);

    assert_eq!(err.kind(), ErrorKind::TransientFailure);
    let diagnostic = format!("{} {:?}", err, err);
    assert!(diagnostic.contains("500"));
    for leaked in ["s3cr@t", "s3cr%40t", "pass%21", "LogOnDetails.Password="] {
        assert!(!diagnostic.contains(leaked), "diagnostic leaked {}", leaked);
    }
    submit.assert();
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_session_logs_carry_no_portal_address_or_password() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("portal_sync=trace"))
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let _default = tracing::subscriber::set_default(subscriber);

    let server = MockServer::start();
    let mocks = mock_portal(&server);
    let cipher = test_cipher();
    let store = MemoryStore::with_profiles(vec![connected_profile(
        &cipher,
        "u1",
        &server.base_url(),
        PASSWORD,
    )]);
    let service = service(store, cipher);

    tokio_test::assert_ok!(service.fetch_portal_data("u1", "averages").await);
    mocks.transcript.assert();

    let captured = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert!(captured.contains("Session state"));
    assert!(!captured.contains(PASSWORD));
    assert!(!captured.contains("127.0.0.1"));
    assert!(!captured.contains(&format!(":{}", server.port())));
}

use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::{Signer, SigningKey};
use fleetgate_auth::access_token_hash;
use reqwest::StatusCode;
use serde_json::{Value, json};

const DEV_PASSWORD: &str = "fleetgate-dev";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = fleetgate_api::app::build_app("test-secret".to_string()).await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ─── DPoP test client ────────────────────────────────────────────────────────

static JTI: AtomicU64 = AtomicU64::new(0);

fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

fn dpop_proof(
    key: &SigningKey,
    method: &str,
    htu: &str,
    nonce: Option<&str>,
    access_token: Option<&str>,
) -> String {
    let jwk = json!({
        "kty": "OKP",
        "crv": "Ed25519",
        "x": URL_SAFE_NO_PAD.encode(key.verifying_key().to_bytes()),
    });
    let header = json!({ "typ": "dpop+jwt", "alg": "EdDSA", "jwk": jwk });

    let mut payload = json!({
        "jti": format!("bb-jti-{}", JTI.fetch_add(1, Ordering::Relaxed)),
        "iat": chrono::Utc::now().timestamp(),
        "htm": method,
        "htu": htu,
    });
    if let Some(nonce) = nonce {
        payload["nonce"] = json!(nonce);
    }
    if let Some(token) = access_token {
        payload["ath"] = json!(access_token_hash(token));
    }

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap()),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap()),
    );
    let signature = key.sign(signing_input.as_bytes());
    format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature.to_bytes()))
}

async fn login(client: &reqwest::Client, base_url: &str, email: &str) -> Value {
    let res = client
        .post(format!("{base_url}/auth/login"))
        .json(&json!({ "email": email, "password": DEV_PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.json().await.unwrap()
}

// ─── tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_and_emergency_status_are_public() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/health", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(format!("{}/system/emergency", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["active"], json!(false));
}

#[tokio::test]
async fn login_and_whoami() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let tokens = login(&client, &srv.base_url, "admin@fleetgate.dev").await;
    assert_eq!(tokens["token_type"], json!("Bearer"));

    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(tokens["access_token"].as_str().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user_id"], json!(1));
    assert_eq!(body["context"], json!("SYSTEM"));
    assert!(
        body["permissions"]
            .as_array()
            .unwrap()
            .iter()
            .any(|p| p == "system:all")
    );
}

#[tokio::test]
async fn bad_credentials_fail_uniformly() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let unknown = client
        .post(format!("{}/auth/login", srv.base_url))
        .json(&json!({ "email": "nobody@fleetgate.dev", "password": DEV_PASSWORD }))
        .send()
        .await
        .unwrap();
    let wrong = client
        .post(format!("{}/auth/login", srv.base_url))
        .json(&json!({ "email": "admin@fleetgate.dev", "password": "wrong" }))
        .send()
        .await
        .unwrap();

    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    // Identical bodies: no way to tell "unknown user" from "wrong password".
    let unknown_body: Value = unknown.json().await.unwrap();
    let wrong_body: Value = wrong.json().await.unwrap();
    assert_eq!(unknown_body, wrong_body);
}

#[tokio::test]
async fn refresh_rotates_and_old_token_dies() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let tokens = login(&client, &srv.base_url, "admin@fleetgate.dev").await;
    let old_refresh = tokens["refresh_token"].as_str().unwrap().to_string();

    let res = client
        .post(format!("{}/auth/refresh", srv.base_url))
        .json(&json!({ "refresh_token": old_refresh }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let rotated: Value = res.json().await.unwrap();
    assert_ne!(rotated["refresh_token"], tokens["refresh_token"]);

    // The rotated-out token is dead.
    let res = client
        .post(format!("{}/auth/refresh", srv.base_url))
        .json(&json!({ "refresh_token": old_refresh }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn revoke_all_kills_every_refresh_token() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let first = login(&client, &srv.base_url, "admin@fleetgate.dev").await;
    let second = login(&client, &srv.base_url, "admin@fleetgate.dev").await;

    let res = client
        .post(format!("{}/auth/revoke-all", srv.base_url))
        .bearer_auth(first["access_token"].as_str().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["revoked"], json!(2));

    for tokens in [first, second] {
        let res = client
            .post(format!("{}/auth/refresh", srv.base_url))
            .json(&json!({ "refresh_token": tokens["refresh_token"] }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn dpop_bound_session_end_to_end() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let key = signing_key(42);
    let login_url = format!("{}/auth/login", srv.base_url);

    // First attempt has no nonce yet: rejected, challenge carries one.
    let blind_proof = dpop_proof(&key, "POST", &login_url, None, None);
    let res = client
        .post(&login_url)
        .header("DPoP", blind_proof)
        .json(&json!({ "email": "admin@fleetgate.dev", "password": DEV_PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let nonce = res
        .headers()
        .get("DPoP-Nonce")
        .expect("401 must carry a fresh nonce")
        .to_str()
        .unwrap()
        .to_string();

    // Retry with the issued nonce: bound pair.
    let proof = dpop_proof(&key, "POST", &login_url, Some(&nonce), None);
    let res = client
        .post(&login_url)
        .header("DPoP", proof)
        .json(&json!({ "email": "admin@fleetgate.dev", "password": DEV_PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let tokens: Value = res.json().await.unwrap();
    assert_eq!(tokens["token_type"], json!("DPoP"));
    let access = tokens["access_token"].as_str().unwrap().to_string();

    // A bound token without a proof never authenticates, and the failure
    // hands out the nonce for the retry.
    let whoami_url = format!("{}/whoami", srv.base_url);
    let res = client.get(&whoami_url).bearer_auth(&access).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let nonce = res
        .headers()
        .get("DPoP-Nonce")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    // Proof bound to this request and this token: accepted.
    let proof = dpop_proof(&key, "GET", &whoami_url, Some(&nonce), Some(&access));
    let res = client
        .get(&whoami_url)
        .bearer_auth(&access)
        .header("DPoP", proof.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["proof_bound"], json!(true));

    // Replaying the identical proof is rejected.
    let res = client
        .get(&whoami_url)
        .bearer_auth(&access)
        .header("DPoP", proof)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn stolen_bound_token_fails_with_wrong_key() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let key = signing_key(7);
    let login_url = format!("{}/auth/login", srv.base_url);

    // Bind a session to `key`.
    let res = client
        .post(&login_url)
        .header("DPoP", dpop_proof(&key, "POST", &login_url, None, None))
        .json(&json!({ "email": "admin@fleetgate.dev", "password": DEV_PASSWORD }))
        .send()
        .await
        .unwrap();
    let nonce = res.headers()["DPoP-Nonce"].to_str().unwrap().to_string();
    let res = client
        .post(&login_url)
        .header("DPoP", dpop_proof(&key, "POST", &login_url, Some(&nonce), None))
        .json(&json!({ "email": "admin@fleetgate.dev", "password": DEV_PASSWORD }))
        .send()
        .await
        .unwrap();
    let tokens: Value = res.json().await.unwrap();
    let access = tokens["access_token"].as_str().unwrap().to_string();

    // The "thief" holds the token but a different key.
    let thief = signing_key(99);
    let whoami_url = format!("{}/whoami", srv.base_url);
    let res = client.get(&whoami_url).bearer_auth(&access).send().await.unwrap();
    let nonce = res.headers()["DPoP-Nonce"].to_str().unwrap().to_string();

    let res = client
        .get(&whoami_url)
        .bearer_auth(&access)
        .header("DPoP", dpop_proof(&thief, "GET", &whoami_url, Some(&nonce), Some(&access)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn context_switch_grants_temporary_org_membership() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let tokens = login(&client, &srv.base_url, "admin@fleetgate.dev").await;
    let access = tokens["access_token"].as_str().unwrap();

    // Without the claim: SYSTEM permissions, but not an org member.
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(access)
        .header("X-Organization-Id", "5")
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["org_member"], json!(false));

    let res = client
        .post(format!("{}/auth/context-switch", srv.base_url))
        .bearer_auth(access)
        .json(&json!({ "organization_id": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let switched: Value = res.json().await.unwrap();
    let switched_access = switched["access_token"].as_str().unwrap();

    // The delegation applies to its organization only.
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(switched_access)
        .header("X-Organization-Id", "5")
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["org_member"], json!(true));

    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(switched_access)
        .header("X-Organization-Id", "7")
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["org_member"], json!(false));
}

#[tokio::test]
async fn context_switch_requires_the_switch_permission() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    // The steward role does not carry system:context_switch.
    let tokens = login(&client, &srv.base_url, "operator@fleetgate.dev").await;
    let res = client
        .post(format!("{}/auth/context-switch", srv.base_url))
        .bearer_auth(tokens["access_token"].as_str().unwrap())
        .json(&json!({ "organization_id": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn role_administration_scenarios() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let admin = login(&client, &srv.base_url, "admin@fleetgate.dev").await;
    let admin_access = admin["access_token"].as_str().unwrap();
    let operator = login(&client, &srv.base_url, "operator@fleetgate.dev").await;
    let operator_access = operator["access_token"].as_str().unwrap();

    // Prime admin promotes a user into the steward tier.
    let res = client
        .post(format!("{}/admin/roles/assign", srv.base_url))
        .bearer_auth(admin_access)
        .json(&json!({ "user_id": 3, "role_id": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["rule"], json!("prime_admin_assigns_any_role"));

    // Steward cannot revoke the last prime admin.
    let res = client
        .post(format!("{}/admin/roles/revoke", srv.base_url))
        .bearer_auth(operator_access)
        .json(&json!({ "user_id": 1, "role_id": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .contains("steward_cannot_orphan_prime")
    );

    // Steward has no rule for organization-context management.
    let res = client
        .post(format!("{}/admin/roles/assign", srv.base_url))
        .bearer_auth(operator_access)
        .json(&json!({ "user_id": 5, "role_id": 4, "organization_id": 9 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Filling the prime tier to its cap of 3, then one more: conflict.
    for user_id in [10, 11] {
        let res = client
            .post(format!("{}/admin/roles/assign", srv.base_url))
            .bearer_auth(admin_access)
            .json(&json!({ "user_id": user_id, "role_id": 1 }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }
    let res = client
        .post(format!("{}/admin/roles/assign", srv.base_url))
        .bearer_auth(admin_access)
        .json(&json!({ "user_id": 12, "role_id": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn role_catalogue_requires_manage_permission() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let tokens = login(&client, &srv.base_url, "admin@fleetgate.dev").await;
    let res = client
        .get(format!("{}/admin/roles", srv.base_url))
        .bearer_auth(tokens["access_token"].as_str().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["roles"].as_array().unwrap().len(), 4);
}

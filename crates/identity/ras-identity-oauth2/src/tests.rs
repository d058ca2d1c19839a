//! Integration and security tests for the customer account login flow.

#[cfg(test)]
mod integration_tests {
    use crate::{
        CallbackParams, CustomerAccountConfig, CustomerAccountFlow, CustomerTokens, ErrorClass,
        OAuth2Error, RequestOrigin, base64url, session_keys,
    };
    use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
    use ras_identity_session::{MemorySession, SessionStore, SessionStoreExt};
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use url::Url;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CLIENT_ID: &str = "shp_client_123";

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn unsigned_id_token(nonce: &str) -> String {
        format!(
            "{}.{}.signature",
            base64url::encode(r#"{"alg":"ES256","kid":"k"}"#),
            base64url::encode(serde_json::json!({ "nonce": nonce, "sub": "42" }).to_string())
        )
    }

    async fn setup_flow() -> (MockServer, CustomerAccountFlow) {
        init_tracing();
        let mock_server = MockServer::start().await;

        let config = CustomerAccountConfig::new()
            .with_provider_url(mock_server.uri())
            .with_client_id(CLIENT_ID);
        let flow = CustomerAccountFlow::new(config).unwrap();

        (mock_server, flow)
    }

    fn query_params(location: &str) -> HashMap<String, String> {
        Url::parse(location)
            .unwrap()
            .query_pairs()
            .into_owned()
            .collect()
    }

    fn callback(code: &str, state: &str) -> CallbackParams {
        CallbackParams {
            code: Some(code.to_string()),
            state: Some(state.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_full_login_flow() {
        let (mock_server, flow) = setup_flow().await;
        let origin = RequestOrigin::parse("https://shop.example.com").unwrap();
        let mut session = MemorySession::new();

        let login = flow.begin_login(&origin, &mut session).await.unwrap();
        assert_eq!(session.commits(), 1);

        let params = query_params(login.location());
        assert!(
            login
                .location()
                .starts_with(&format!("{}/auth/oauth/authorize?", mock_server.uri()))
        );
        assert_eq!(params["client_id"], CLIENT_ID);
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["redirect_uri"], "https://shop.example.com/authorize");
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(
            params["scope"],
            "openid email https://api.customers.com/auth/customer.graphql"
        );

        let verifier = session
            .get_str(session_keys::CODE_VERIFIER)
            .unwrap()
            .to_string();
        assert_eq!(params["code_challenge"], crate::generate_challenge(&verifier));
        assert_eq!(session.get_str(session_keys::NONCE), Some(params["nonce"].as_str()));
        assert_eq!(session.get_str(session_keys::STATE), Some(params["state"].as_str()));
        assert_ne!(params["state"], params["nonce"]);

        Mock::given(method("POST"))
            .and(path("/auth/oauth/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(header("origin", "https://shop.example.com"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains(format!("client_id={}", CLIENT_ID)))
            .and(body_string_contains("code=auth-code-1"))
            .and(body_string_contains(format!("code_verifier={}", verifier)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "AT",
                "refresh_token": "RT",
                "id_token": unsigned_id_token(&params["nonce"]),
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let done = flow
            .complete_login(&origin, callback("auth-code-1", &params["state"]), &mut session)
            .await
            .unwrap();

        assert_eq!(done.location(), "/");
        assert_eq!(session.commits(), 2);

        let tokens = CustomerTokens::from_session(&session).unwrap();
        assert_eq!(tokens.access_token, "AT");
        assert_eq!(tokens.refresh_token, "RT");
        assert_eq!(tokens.expires_in, 3600);

        // One-shot values are gone, so replaying the callback fails closed
        assert!(session.get(session_keys::CODE_VERIFIER).is_none());
        let replay = flow
            .complete_login(&origin, callback("auth-code-1", &params["state"]), &mut session)
            .await;
        assert!(matches!(replay, Err(OAuth2Error::StateMismatch)));
    }

    #[tokio::test]
    async fn test_missing_code_rejected() {
        let (_mock_server, flow) = setup_flow().await;
        let origin = RequestOrigin::parse("https://shop.example.com").unwrap();
        let mut session = MemorySession::new();
        flow.begin_login(&origin, &mut session).await.unwrap();

        let params = CallbackParams {
            state: session.get_str(session_keys::STATE).map(str::to_string),
            ..Default::default()
        };
        let result = flow.complete_login(&origin, params, &mut session).await;

        let err = result.unwrap_err();
        assert!(matches!(err, OAuth2Error::MissingAuthorizationCode));
        assert_eq!(err.class(), ErrorClass::ClientInput);
        assert_eq!(session.commits(), 1);
    }

    #[tokio::test]
    async fn test_state_mismatch_rejected_before_exchange() {
        let (mock_server, flow) = setup_flow().await;
        let origin = RequestOrigin::parse("https://shop.example.com").unwrap();
        let mut session = MemorySession::new();
        flow.begin_login(&origin, &mut session).await.unwrap();

        Mock::given(method("POST"))
            .and(path("/auth/oauth/token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let result = flow
            .complete_login(&origin, callback("code", "forged-state"), &mut session)
            .await;
        assert!(matches!(result, Err(OAuth2Error::StateMismatch)));

        let no_state = CallbackParams {
            code: Some("code".to_string()),
            ..Default::default()
        };
        let result = flow.complete_login(&origin, no_state, &mut session).await;
        assert!(matches!(result, Err(OAuth2Error::StateMismatch)));
    }

    #[tokio::test]
    async fn test_nonce_mismatch_commits_nothing() {
        let (mock_server, flow) = setup_flow().await;
        let origin = RequestOrigin::parse("https://shop.example.com").unwrap();
        let mut session = MemorySession::new();
        let login = flow.begin_login(&origin, &mut session).await.unwrap();
        let params = query_params(login.location());

        Mock::given(method("POST"))
            .and(path("/auth/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "AT",
                "refresh_token": "RT",
                "id_token": unsigned_id_token("someone-elses-nonce"),
                "expires_in": 3600
            })))
            .mount(&mock_server)
            .await;

        let result = flow
            .complete_login(&origin, callback("code", &params["state"]), &mut session)
            .await;

        assert!(matches!(result, Err(OAuth2Error::NonceMismatch)));
        assert!(session.get(session_keys::ACCESS_TOKEN).is_none());
        assert!(session.get(session_keys::CODE_VERIFIER).is_some());
        assert_eq!(session.commits(), 1);
    }

    #[tokio::test]
    async fn test_upstream_error_propagated_verbatim() {
        let (mock_server, flow) = setup_flow().await;
        let origin = RequestOrigin::parse("https://shop.example.com").unwrap();
        let mut session = MemorySession::new();
        let login = flow.begin_login(&origin, &mut session).await.unwrap();
        let params = query_params(login.location());

        Mock::given(method("POST"))
            .and(path("/auth/oauth/token"))
            .respond_with(ResponseTemplate::new(500).set_body_string("server error"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = flow
            .complete_login(&origin, callback("code", &params["state"]), &mut session)
            .await;

        match result {
            Err(OAuth2Error::TokenExchangeFailed { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "server error");
            }
            other => panic!("Expected TokenExchangeFailed, got {:?}", other),
        }
        assert!(session.get(session_keys::ACCESS_TOKEN).is_none());
        assert_eq!(session.commits(), 1);
    }

    #[tokio::test]
    async fn test_malformed_token_response() {
        let (mock_server, flow) = setup_flow().await;
        let origin = RequestOrigin::parse("https://shop.example.com").unwrap();
        let mut session = MemorySession::new();
        let login = flow.begin_login(&origin, &mut session).await.unwrap();
        let params = query_params(login.location());

        Mock::given(method("POST"))
            .and(path("/auth/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let result = flow
            .complete_login(&origin, callback("code", &params["state"]), &mut session)
            .await;
        assert!(matches!(result, Err(OAuth2Error::InvalidTokenResponse(_))));
    }

    #[tokio::test]
    async fn test_malformed_id_token_rejected() {
        let (mock_server, flow) = setup_flow().await;
        let origin = RequestOrigin::parse("https://shop.example.com").unwrap();
        let mut session = MemorySession::new();
        let login = flow.begin_login(&origin, &mut session).await.unwrap();
        let params = query_params(login.location());

        Mock::given(method("POST"))
            .and(path("/auth/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "AT",
                "refresh_token": "RT",
                "id_token": "header.%%%.sig",
                "expires_in": 3600
            })))
            .mount(&mock_server)
            .await;

        let err = flow
            .complete_login(&origin, callback("code", &params["state"]), &mut session)
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Decode);
        assert!(session.get(session_keys::ACCESS_TOKEN).is_none());
    }

    #[tokio::test]
    async fn test_insecure_origin_normalized_for_exchange() {
        let (mock_server, flow) = setup_flow().await;
        let origin = RequestOrigin::parse("http://abc-123.ngrok-free.app").unwrap();
        let mut session = MemorySession::new();
        let login = flow.begin_login(&origin, &mut session).await.unwrap();
        let params = query_params(login.location());

        Mock::given(method("POST"))
            .and(path("/auth/oauth/token"))
            .and(body_string_contains(
                "redirect_uri=https%3A%2F%2Fabc-123.ngrok-free.app%2Fauthorize",
            ))
            .and(header("origin", "https://abc-123.ngrok-free.app"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "AT",
                "refresh_token": "RT",
                "id_token": unsigned_id_token(&params["nonce"]),
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        flow.complete_login(&origin, callback("code", &params["state"]), &mut session)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_lost_verifier_fails_closed() {
        let (_mock_server, flow) = setup_flow().await;
        let origin = RequestOrigin::parse("https://shop.example.com").unwrap();
        let mut session = MemorySession::new();
        flow.begin_login(&origin, &mut session).await.unwrap();
        let state = session.get_str(session_keys::STATE).unwrap().to_string();

        session.remove(session_keys::CODE_VERIFIER);

        let result = flow
            .complete_login(&origin, callback("code", &state), &mut session)
            .await;
        assert!(matches!(result, Err(OAuth2Error::MissingCodeVerifier)));
        assert!(session.get(session_keys::CODE_VERIFIER).is_none());
    }

    #[tokio::test]
    async fn test_provider_error_callback() {
        let (_mock_server, flow) = setup_flow().await;
        let origin = RequestOrigin::parse("https://shop.example.com").unwrap();
        let mut session = MemorySession::new();

        let params = CallbackParams {
            error: Some("access_denied".to_string()),
            error_description: Some("The customer cancelled".to_string()),
            ..Default::default()
        };
        let result = flow.complete_login(&origin, params, &mut session).await;

        match result {
            Err(OAuth2Error::CallbackError(message)) => {
                assert_eq!(message, "access_denied: The customer cancelled");
            }
            other => panic!("Expected CallbackError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unconfigured_client_is_config_error() {
        let flow = CustomerAccountFlow::new(CustomerAccountConfig::new()).unwrap();
        let origin = RequestOrigin::parse("https://shop.example.com").unwrap();
        let mut session = MemorySession::new();

        let err = flow.begin_login(&origin, &mut session).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Configuration);
        assert_eq!(session.commits(), 0);
    }

    #[tokio::test]
    async fn test_state_and_nonce_unique_per_login() {
        let (_mock_server, flow) = setup_flow().await;
        let origin = RequestOrigin::parse("https://shop.example.com").unwrap();

        let mut seen = HashSet::new();
        for _ in 0..50 {
            let mut session = MemorySession::new();
            let login = flow.begin_login(&origin, &mut session).await.unwrap();
            let params = query_params(login.location());
            assert!(seen.insert(params["state"].clone()));
            assert!(seen.insert(params["nonce"].clone()));
            assert!(seen.insert(params["code_challenge"].clone()));
        }
    }

    #[tokio::test]
    async fn test_token_endpoint_timeout_rejects() {
        init_tracing();
        let mock_server = MockServer::start().await;
        let config = CustomerAccountConfig::new()
            .with_provider_url(mock_server.uri())
            .with_client_id(CLIENT_ID)
            .with_http_timeout(1);
        let flow = CustomerAccountFlow::new(config).unwrap();

        let origin = RequestOrigin::parse("https://shop.example.com").unwrap();
        let mut session = MemorySession::new();
        let login = flow.begin_login(&origin, &mut session).await.unwrap();
        let params = query_params(login.location());

        Mock::given(method("POST"))
            .and(path("/auth/oauth/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({
                        "access_token": "AT",
                        "refresh_token": "RT",
                        "id_token": unsigned_id_token(&params["nonce"]),
                        "expires_in": 3600
                    }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;

        let err = flow
            .complete_login(&origin, callback("code", &params["state"]), &mut session)
            .await
            .unwrap_err();

        assert!(matches!(err, OAuth2Error::HttpError(_)));
        assert_eq!(err.class(), ErrorClass::Transport);
        assert_eq!(session.commits(), 1);
        assert!(CustomerTokens::from_session(&session).is_none());
    }

    #[tokio::test]
    async fn test_truncated_error_body_is_transport_failure() {
        init_tracing();

        // Announces a longer body than it sends, then hangs up
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 8192];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(
                    b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 100\r\n\r\nserver",
                )
                .await;
        });

        let config = CustomerAccountConfig::new()
            .with_provider_url(format!("http://{}", addr))
            .with_client_id(CLIENT_ID);
        let flow = CustomerAccountFlow::new(config).unwrap();

        let origin = RequestOrigin::parse("https://shop.example.com").unwrap();
        let mut session = MemorySession::new();
        let login = flow.begin_login(&origin, &mut session).await.unwrap();
        let params = query_params(login.location());

        let err = flow
            .complete_login(&origin, callback("code", &params["state"]), &mut session)
            .await
            .unwrap_err();

        assert!(matches!(err, OAuth2Error::HttpError(_)));
        assert_eq!(err.class(), ErrorClass::Transport);
    }

    mod verified {
        use super::*;

        const SIGNING_SECRET: &[u8] = b"provider-signing-secret-for-tests";

        fn signed_id_token(nonce: &str, secret: &[u8], audience: &str) -> String {
            signed_with_key(nonce, secret, audience, "key-1", Algorithm::HS256)
        }

        fn signed_with_key(
            nonce: &str,
            secret: &[u8],
            audience: &str,
            kid: &str,
            alg: Algorithm,
        ) -> String {
            let mut header = Header::new(alg);
            header.kid = Some(kid.to_string());
            let claims = serde_json::json!({
                "nonce": nonce,
                "sub": "gid://shopify/Customer/42",
                "aud": audience,
                "iss": "https://shopify.com/1",
                "exp": 4_102_444_800i64,
            });
            encode(&header, &claims, &EncodingKey::from_secret(secret)).unwrap()
        }

        fn with_key(kid: &'static str, secret: &'static [u8]) -> impl Fn(&str) -> String {
            move |nonce| signed_with_key(nonce, secret, CLIENT_ID, kid, Algorithm::HS256)
        }

        fn oct_key(kid: &str, secret: &[u8]) -> serde_json::Value {
            serde_json::json!({
                "kty": "oct",
                "kid": kid,
                "alg": "HS256",
                "k": base64url::encode(secret)
            })
        }

        async fn setup_verifying_flow() -> (MockServer, CustomerAccountFlow) {
            init_tracing();
            let mock_server = MockServer::start().await;

            Mock::given(method("GET"))
                .and(path("/.well-known/jwks.json"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "keys": [oct_key("key-1", SIGNING_SECRET)]
                })))
                .mount(&mock_server)
                .await;

            let flow = verifying_flow(&mock_server);
            (mock_server, flow)
        }

        fn verifying_flow(mock_server: &MockServer) -> CustomerAccountFlow {
            let config = CustomerAccountConfig::new()
                .with_provider_url(mock_server.uri())
                .with_client_id(CLIENT_ID)
                .with_jwks_uri(format!("{}/.well-known/jwks.json", mock_server.uri()))
                .with_issuer("https://shopify.com/1");
            CustomerAccountFlow::new(config).unwrap()
        }

        /// One complete login on an existing flow; the token endpoint answers
        /// only for `code`.
        async fn login_with(
            mock_server: &MockServer,
            flow: &CustomerAccountFlow,
            code: &str,
            id_token_for: impl Fn(&str) -> String,
        ) -> Result<(), OAuth2Error> {
            let origin = RequestOrigin::parse("https://shop.example.com").unwrap();
            let mut session = MemorySession::new();
            let login = flow.begin_login(&origin, &mut session).await?;
            let params = query_params(login.location());

            Mock::given(method("POST"))
                .and(path("/auth/oauth/token"))
                .and(body_string_contains(format!("code={}&", code)))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": "AT",
                    "refresh_token": "RT",
                    "id_token": id_token_for(&params["nonce"]),
                    "expires_in": 3600
                })))
                .mount(mock_server)
                .await;

            flow.complete_login(&origin, callback(code, &params["state"]), &mut session)
                .await
                .map(|_| ())
        }

        async fn run(id_token_for: impl Fn(&str) -> String) -> Result<(), OAuth2Error> {
            let (mock_server, flow) = setup_verifying_flow().await;
            let origin = RequestOrigin::parse("https://shop.example.com").unwrap();
            let mut session = MemorySession::new();
            let login = flow.begin_login(&origin, &mut session).await?;
            let params = query_params(login.location());

            Mock::given(method("POST"))
                .and(path("/auth/oauth/token"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": "AT",
                    "refresh_token": "RT",
                    "id_token": id_token_for(&params["nonce"]),
                    "expires_in": 3600
                })))
                .mount(&mock_server)
                .await;

            flow.complete_login(&origin, callback("code", &params["state"]), &mut session)
                .await
                .map(|_| ())
        }

        #[tokio::test]
        async fn test_signed_id_token_accepted() {
            run(|nonce| signed_id_token(nonce, SIGNING_SECRET, CLIENT_ID))
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn test_forged_signature_rejected() {
            let err = run(|nonce| signed_id_token(nonce, b"attacker-secret", CLIENT_ID))
                .await
                .unwrap_err();
            assert!(matches!(err, OAuth2Error::IdTokenVerification(_)));
            assert_eq!(err.class(), ErrorClass::Decode);
        }

        #[tokio::test]
        async fn test_wrong_audience_rejected() {
            let err = run(|nonce| signed_id_token(nonce, SIGNING_SECRET, "another-client"))
                .await
                .unwrap_err();
            assert_eq!(err.class(), ErrorClass::Decode);
        }

        #[tokio::test]
        async fn test_unsigned_token_rejected_when_verifying() {
            let err = run(|nonce| unsigned_id_token(nonce)).await.unwrap_err();
            assert_eq!(err.class(), ErrorClass::Decode);
        }

        #[tokio::test]
        async fn test_key_rotation_refetches_jwks() {
            init_tracing();
            let mock_server = MockServer::start().await;
            const ROTATED_SECRET: &[u8] = b"rotated-provider-signing-secret";

            Mock::given(method("GET"))
                .and(path("/.well-known/jwks.json"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "keys": [oct_key("key-1", SIGNING_SECRET)]
                })))
                .up_to_n_times(1)
                .expect(1)
                .mount(&mock_server)
                .await;
            Mock::given(method("GET"))
                .and(path("/.well-known/jwks.json"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "keys": [
                        oct_key("key-1", SIGNING_SECRET),
                        oct_key("key-2", ROTATED_SECRET)
                    ]
                })))
                .expect(2)
                .mount(&mock_server)
                .await;

            let flow = verifying_flow(&mock_server);

            // First fetch, then served from the cache
            login_with(&mock_server, &flow, "c1", with_key("key-1", SIGNING_SECRET))
                .await
                .unwrap();
            login_with(&mock_server, &flow, "c2", with_key("key-1", SIGNING_SECRET))
                .await
                .unwrap();

            // Unknown kid triggers a refetch that picks up the rotated key
            login_with(&mock_server, &flow, "c3", with_key("key-2", ROTATED_SECRET))
                .await
                .unwrap();

            // Still unknown after a refetch
            let err = login_with(&mock_server, &flow, "c4", with_key("key-9", ROTATED_SECRET))
                .await
                .unwrap_err();
            assert!(matches!(err, OAuth2Error::InvalidIdToken(_)));
            assert_eq!(err.class(), ErrorClass::Decode);
        }

        #[tokio::test]
        async fn test_unknown_key_id_rejected() {
            let err = run(|nonce| {
                signed_with_key(nonce, SIGNING_SECRET, CLIENT_ID, "key-9", Algorithm::HS256)
            })
            .await
            .unwrap_err();
            assert!(matches!(err, OAuth2Error::InvalidIdToken(_)));
        }

        #[tokio::test]
        async fn test_algorithm_must_match_key() {
            let err = run(|nonce| {
                signed_with_key(nonce, SIGNING_SECRET, CLIENT_ID, "key-1", Algorithm::HS384)
            })
            .await
            .unwrap_err();
            assert!(matches!(err, OAuth2Error::InvalidIdToken(_)));
            assert_eq!(err.class(), ErrorClass::Decode);
        }
    }
}

use std::collections::BTreeMap;

use mockito::Matcher;
use relingo::backend::{AdapterRequest, BackendAdapter, CustomApiAdapter};
use relingo::config::CustomApiConfig;
use relingo::error::RelingoError;
use relingo::transport::HttpMethod;
use relingo::LanguageCode;

fn config(endpoint: String) -> CustomApiConfig {
    CustomApiConfig {
        enabled: true,
        endpoint,
        retry_count: 0,
        retry_delay_ms: 1,
        timeout_secs: 5,
        ..CustomApiConfig::default()
    }
}

fn request(text: &str) -> AdapterRequest<'_> {
    AdapterRequest {
        text,
        from: LanguageCode::En,
        to: LanguageCode::Fr,
        max_tokens: None,
    }
}

#[tokio::test]
async fn test_post_with_template_and_nested_response_path() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v2/translate")
        .match_header("x-api-key", "secret")
        .match_body(Matcher::Json(serde_json::json!({
            "q": "say \"hi\"",
            "source": "en",
            "target": "fr"
        })))
        .with_status(200)
        .with_body(r#"{"data":{"translations":[{"text":"dis \"salut\""}]}}"#)
        .create_async()
        .await;

    let mut headers = BTreeMap::new();
    headers.insert("X-Api-Key".to_string(), "{{apiKey}}".to_string());
    let adapter = CustomApiAdapter::new(CustomApiConfig {
        api_key: "secret".to_string(),
        request_template: Some(
            r#"{"q":"{{text}}","source":"{{from}}","target":"{{to}}"}"#.to_string(),
        ),
        response_path: "data.translations.0.text".to_string(),
        headers,
        ..config(format!("{}/v2/translate", server.url()))
    })
    .unwrap();

    adapter.validate_config().unwrap();
    let text = adapter.translate_raw(request("say \"hi\"")).await.unwrap();
    assert_eq!(text, "dis \"salut\"");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_get_maps_fields_to_query() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/translate")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("text".into(), "good morning".into()),
            Matcher::UrlEncoded("source_lang".into(), "en".into()),
            Matcher::UrlEncoded("target_lang".into(), "fr".into()),
            Matcher::UrlEncoded("key".into(), "abc".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"translatedText":"bonjour"}"#)
        .create_async()
        .await;

    let adapter = CustomApiAdapter::new(CustomApiConfig {
        method: HttpMethod::Get,
        api_key: "abc".to_string(),
        api_key_field: Some("key".to_string()),
        ..config(format!("{}/translate", server.url()))
    })
    .unwrap();

    let text = adapter.translate_raw(request("good morning")).await.unwrap();
    assert_eq!(text, "bonjour");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_error_field_in_success_response_fails() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/translate")
        .with_status(200)
        .with_body(r#"{"error":{"message":"unsupported language pair"}}"#)
        .create_async()
        .await;

    let adapter = CustomApiAdapter::new(config(format!("{}/translate", server.url()))).unwrap();
    let error = adapter.translate_raw(request("hello")).await.unwrap_err();

    match error {
        RelingoError::Backend { message, .. } => {
            assert!(message.contains("unsupported language pair"));
        }
        other => panic!("expected backend error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_http_error_uses_provider_message() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/translate")
        .with_status(400)
        .with_body(r#"{"error":"text too long"}"#)
        .expect(1)
        .create_async()
        .await;

    let adapter = CustomApiAdapter::new(config(format!("{}/translate", server.url()))).unwrap();
    let error = adapter.translate_raw(request("hello")).await.unwrap_err();
    assert_eq!(error.to_string(), "custom error: Custom API error 400: text too long");
}

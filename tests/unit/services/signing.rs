//! Unit tests for request signing

use signal_relay::services::signing::{
    bitmart_signature, coinex_signature, hmac_sha256_hex, timestamp_ms,
};

#[test]
fn hmac_sha256_hex_matches_known_vector() {
    let signature =
        hmac_sha256_hex("key", "The quick brown fox jumps over the lazy dog").expect("sign");
    assert_eq!(
        signature,
        "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
    );
}

#[test]
fn bitmart_signs_timestamp_memo_body() {
    let body = r#"{"symbol":"BTCUSDT","side":1}"#;
    let expected = hmac_sha256_hex("secret", &format!("1700000000000#memo#{}", body)).unwrap();
    assert_eq!(
        bitmart_signature("secret", 1_700_000_000_000, "memo", body).unwrap(),
        expected
    );
}

#[test]
fn coinex_signs_method_path_body_timestamp() {
    let body = r#"{"market":"BTCUSDT"}"#;
    let expected = hmac_sha256_hex(
        "secret",
        &format!("POST/v2/futures/order{}1700000000000", body),
    )
    .unwrap();
    assert_eq!(
        coinex_signature("secret", "post", "/v2/futures/order", body, 1_700_000_000_000).unwrap(),
        expected
    );
}

#[test]
fn signature_is_deterministic() {
    let a = bitmart_signature("secret", 1, "memo", r#"{"size":10}"#).unwrap();
    let b = bitmart_signature("secret", 1, "memo", r#"{"size":10}"#).unwrap();
    assert_eq!(a, b);
}

#[test]
fn single_character_change_alters_signature() {
    let original = coinex_signature("secret", "POST", "/p", r#"{"amount":"10"}"#, 1).unwrap();
    let altered = coinex_signature("secret", "POST", "/p", r#"{"amount":"11"}"#, 1).unwrap();
    assert_ne!(original, altered);

    let other_ts = coinex_signature("secret", "POST", "/p", r#"{"amount":"10"}"#, 2).unwrap();
    assert_ne!(original, other_ts);
}

#[test]
fn digest_is_lowercase_hex() {
    let sig = bitmart_signature("k", 0, "", "").unwrap();
    assert_eq!(sig.len(), 64);
    assert!(sig.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
}

#[test]
fn timestamp_is_in_milliseconds() {
    // 2020-09-13 in ms; seconds would be three orders of magnitude smaller
    assert!(timestamp_ms() > 1_600_000_000_000);
}

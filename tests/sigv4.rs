use std::collections::BTreeMap;

use time::macros::datetime;

use coldpush::backend::sigv4::{
    authorization_header, canonical_request, signing_key, string_to_sign, uri_encode,
    Credentials, SignParams, EMPTY_PAYLOAD_SHA256,
};

#[test]
fn encodes_the_unreserved_set_only() {
    assert_eq!(uri_encode("AZaz09-_.~", true), "AZaz09-_.~");
    assert_eq!(uri_encode("a b", true), "a%20b");
    assert_eq!(uri_encode("a/b@c", true), "a%2Fb%40c");
    // Path variant keeps slashes verbatim
    assert_eq!(uri_encode("/vaults/my vault", false), "/vaults/my%20vault");
}

#[test]
fn derives_the_documented_signing_key() {
    let key = signing_key(
        "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
        "20150830",
        "us-east-1",
        "iam",
    );
    assert_eq!(
        hex::encode(key),
        "c4afb1cc5771d871763a393e44b703571b55cc28424d1a5e86da6ed3c154a4b9"
    );
}

#[test]
fn signs_the_documented_iam_request() {
    // GET https://iam.amazonaws.com/?Action=ListUsers&Version=2010-05-08
    // from the AWS SigV4 developer documentation
    let mut headers = BTreeMap::new();
    headers.insert(
        "content-type".to_string(),
        "application/x-www-form-urlencoded; charset=utf-8".to_string(),
    );
    headers.insert("host".to_string(), "iam.amazonaws.com".to_string());
    headers.insert("x-amz-date".to_string(), "20150830T123600Z".to_string());
    let query = vec![
        ("Action".to_string(), "ListUsers".to_string()),
        ("Version".to_string(), "2010-05-08".to_string()),
    ];
    let params = SignParams {
        method: "GET",
        path: "/",
        query: &query,
        headers: &headers,
        payload_sha256: EMPTY_PAYLOAD_SHA256,
        region: "us-east-1",
        service: "iam",
        timestamp: datetime!(2015-08-30 12:36:00 UTC),
    };

    let canonical = canonical_request(&params);
    let expected_canonical = "GET\n\
        /\n\
        Action=ListUsers&Version=2010-05-08\n\
        content-type:application/x-www-form-urlencoded; charset=utf-8\n\
        host:iam.amazonaws.com\n\
        x-amz-date:20150830T123600Z\n\
        \n\
        content-type;host;x-amz-date\n\
        e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    assert_eq!(canonical, expected_canonical);

    let to_sign = string_to_sign(&params, &canonical);
    let expected_to_sign = "AWS4-HMAC-SHA256\n\
        20150830T123600Z\n\
        20150830/us-east-1/iam/aws4_request\n\
        f536975d06c0309214f805bb90ccff089219ecd68b2577efef23edd43b7e1a59";
    assert_eq!(to_sign, expected_to_sign);

    let creds = Credentials {
        access_key: "AKIDEXAMPLE".to_string(),
        secret_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
    };
    let authorization = authorization_header(&creds, &params);
    assert_eq!(
        authorization,
        "AWS4-HMAC-SHA256 \
         Credential=AKIDEXAMPLE/20150830/us-east-1/iam/aws4_request, \
         SignedHeaders=content-type;host;x-amz-date, \
         Signature=5d672d79c15b13162d9279b0855cfba6789a8edb4c82c400e06b5924a6f2b5d7"
    );
}

#[test]
fn query_pairs_are_sorted_and_encoded() {
    let headers = BTreeMap::from([("host".to_string(), "example.com".to_string())]);
    let query = vec![
        ("b".to_string(), "2 2".to_string()),
        ("a".to_string(), "1".to_string()),
    ];
    let params = SignParams {
        method: "GET",
        path: "/",
        query: &query,
        headers: &headers,
        payload_sha256: EMPTY_PAYLOAD_SHA256,
        region: "us-east-1",
        service: "glacier",
        timestamp: datetime!(2015-08-30 12:36:00 UTC),
    };
    let canonical = canonical_request(&params);
    let query_line = canonical.lines().nth(2).unwrap();
    assert_eq!(query_line, "a=1&b=2%202");
}

// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! AWS Signature Version 4 for the admin API of a tenant.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use snafu::{OptionExt, Snafu};
use std::collections::BTreeMap;
use url::Url;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

pub const AMZ_DATE_HEADER: &str = "x-amz-date";
pub const CONTENT_SHA256_HEADER: &str = "x-amz-content-sha256";

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("invalid signing key"))]
    InvalidSigningKey,
}

pub fn sha256_hex(payload: &[u8]) -> String {
    format!("{:x}", Sha256::digest(payload))
}

pub fn amz_date(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}

fn hmac(key: &[u8], data: &str) -> Result<Vec<u8>, Error> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .ok()
        .context(InvalidSigningKeySnafu)?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            b'/' if !encode_slash => encoded.push('/'),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k, true), uri_encode(&v, true)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Value of the `Host` header for `url`, with the port only when it isn't the scheme default.
pub fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    }
}

pub struct Signer<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub region: &'a str,
    pub service: &'a str,
}

impl Signer<'_> {
    /// Returns the `Authorization` header for a request. Every entry of `headers` is signed,
    /// it must contain `host` and `x-amz-date`.
    pub fn authorization(
        &self,
        method: &str,
        url: &Url,
        headers: &BTreeMap<String, String>,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<String, Error> {
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{date}/{}/{}/aws4_request", self.region, self.service);

        let headers: BTreeMap<String, String> = headers
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.trim().to_owned()))
            .collect();
        let canonical_headers: String = headers.iter().map(|(k, v)| format!("{k}:{v}\n")).collect();
        let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

        let path = match url.path() {
            "" => "/",
            path => path,
        };
        let canonical_request = format!(
            "{method}\n{}\n{}\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
            uri_encode(path, false),
            canonical_query(url),
        );

        let string_to_sign = format!(
            "{ALGORITHM}\n{}\n{scope}\n{}",
            amz_date(now),
            sha256_hex(canonical_request.as_bytes())
        );

        let k_date = hmac(format!("AWS4{}", self.secret_key).as_bytes(), &date)?;
        let k_region = hmac(&k_date, self.region)?;
        let k_service = hmac(&k_region, self.service)?;
        let k_signing = hmac(&k_service, "aws4_request")?;
        let signature: String = hmac(&k_signing, &string_to_sign)?
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();

        Ok(format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.access_key
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_get_vanilla() {
        let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        let url = Url::parse("https://example.amazonaws.com/").unwrap();
        let headers = BTreeMap::from([
            ("Host".to_string(), host_header(&url)),
            (AMZ_DATE_HEADER.to_string(), amz_date(now)),
        ]);

        let signer = Signer {
            access_key: "AKIDEXAMPLE",
            secret_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            region: "us-east-1",
            service: "service",
        };

        assert_eq!(
            signer
                .authorization("GET", &url, &headers, &sha256_hex(b""), now)
                .unwrap(),
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
             SignedHeaders=host;x-amz-date, \
             Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
    }

    #[test]
    fn test_empty_secret_key_still_signs() {
        let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        let url = Url::parse("http://rustfs:9000/rustfs/admin/v3/info").unwrap();
        let headers = BTreeMap::from([
            ("host".to_string(), host_header(&url)),
            (AMZ_DATE_HEADER.to_string(), amz_date(now)),
        ]);
        let signer = Signer {
            access_key: "",
            secret_key: "",
            region: "us-east-1",
            service: "s3",
        };

        let authorization = signer
            .authorization("GET", &url, &headers, &sha256_hex(b""), now)
            .unwrap();
        assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=/20150830/us-east-1/s3/"));
        assert_eq!(hmac(b"", "data").unwrap().len(), 32);
    }

    #[test]
    fn test_canonical_query_sorted_and_encoded() {
        let url = Url::parse("http://rustfs:9000/rustfs/admin/v3/add-user?policyName=a b&accessKey=x")
            .unwrap();
        assert_eq!(canonical_query(&url), "accessKey=x&policyName=a%20b");
    }

    #[test]
    fn test_host_header() {
        let url = Url::parse("http://rustfs.default.svc.cluster.local:9000/").unwrap();
        assert_eq!(host_header(&url), "rustfs.default.svc.cluster.local:9000");
        let url = Url::parse("https://example.com:443/").unwrap();
        assert_eq!(host_header(&url), "example.com");
    }
}

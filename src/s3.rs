//! Presigned PUT URLs for S3-compatible blob stores.
//!
//! Implements [`PresignedUrlMinter`](crate::broker::PresignedUrlMinter)
//! with AWS Signature Version 4 query-string signing. URLs are path-style
//! (`https://s3-<region>.amazonaws.com/<bucket>/<key>`), matching the
//! layout receivers use for their unauthenticated GETs.
//!
//! The signature covers four headers — `content-type`, `expires`, `host`
//! and `x-amz-acl` — which are returned alongside the URL; the uploader
//! must replay them verbatim or the store will reject the PUT. `expires`
//! carries the object lifetime requested by the broker, while the
//! `X-Amz-Expires` query parameter carries the much shorter signing
//! validity.

use std::{env, time::Duration};

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::{
    broker::{PresignedPut, PresignedUrlMinter},
    error::{Error, Result},
    protocol::Headers,
};

type HmacSha256 = Hmac<Sha256>;

/// Content type every blob is stored with.
const CONTENT_TYPE: &str = "application/octet-stream";

/// ACL applied to every blob, so receivers can GET without credentials.
const ACL: &str = "public-read";

/// Header names covered by the signature, in canonical (sorted) order.
const SIGNED_HEADERS: &str = "content-type;expires;host;x-amz-acl";

/// SigV4 presigner for an S3-compatible store.
pub struct S3Minter {
    region: String,
    access_key_id: String,
    secret_access_key: String,
}

impl S3Minter {
    /// Creates a presigner with explicit credentials.
    #[must_use]
    pub fn new(region: &str, access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            region: region.to_string(),
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
        }
    }

    /// Creates a presigner from the conventional environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `AWS_ACCESS_KEY_ID` or `AWS_SECRET_ACCESS_KEY`
    /// is unset.
    pub fn from_env(region: &str) -> Result<Self> {
        let access_key_id = env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| Error::internal("AWS_ACCESS_KEY_ID is not set"))?;
        let secret_access_key = env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| Error::internal("AWS_SECRET_ACCESS_KEY is not set"))?;
        Ok(Self::new(region, &access_key_id, &secret_access_key))
    }

    /// Signs a PUT at an explicit instant.
    ///
    /// Split out from the trait method so tests get deterministic output.
    fn presign_put_at(
        &self,
        now: OffsetDateTime,
        bucket: &str,
        key: &str,
        ttl: Duration,
        signing_validity: Duration,
    ) -> Result<PresignedPut> {
        let host = format!("s3-{}.amazonaws.com", self.region);
        let amz_date = fmt_amz_date(now);
        let datestamp = &amz_date[..8];
        let scope = format!("{datestamp}/{}/s3/aws4_request", self.region);
        let expires_header = fmt_http_date(now + ttl);

        let canonical_uri = format!(
            "/{}/{}",
            uri_encode(bucket, false),
            uri_encode(key, false)
        );

        let mut query: Vec<(String, String)> = vec![
            ("X-Amz-Algorithm".to_string(), "AWS4-HMAC-SHA256".to_string()),
            (
                "X-Amz-Credential".to_string(),
                format!("{}/{scope}", self.access_key_id),
            ),
            ("X-Amz-Date".to_string(), amz_date.clone()),
            (
                "X-Amz-Expires".to_string(),
                signing_validity.as_secs().to_string(),
            ),
            ("X-Amz-SignedHeaders".to_string(), SIGNED_HEADERS.to_string()),
        ];
        query.sort();
        let canonical_query = query
            .iter()
            .map(|(name, value)| format!("{}={}", uri_encode(name, true), uri_encode(value, true)))
            .collect::<Vec<_>>()
            .join("&");

        let canonical_headers = format!(
            "content-type:{CONTENT_TYPE}\nexpires:{expires_header}\nhost:{host}\nx-amz-acl:{ACL}\n"
        );
        let canonical_request = format!(
            "PUT\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n\
             {SIGNED_HEADERS}\nUNSIGNED-PAYLOAD"
        );

        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let mut signing_key = hmac_sha256(
            format!("AWS4{}", self.secret_access_key).as_bytes(),
            datestamp.as_bytes(),
        )?;
        for component in [self.region.as_bytes(), b"s3", b"aws4_request"] {
            signing_key = hmac_sha256(&signing_key, component)?;
        }
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

        let url =
            format!("https://{host}{canonical_uri}?{canonical_query}&X-Amz-Signature={signature}");

        let mut headers = Headers::new();
        headers.insert("Content-Type".to_string(), vec![CONTENT_TYPE.to_string()]);
        headers.insert("Expires".to_string(), vec![expires_header]);
        headers.insert("x-amz-acl".to_string(), vec![ACL.to_string()]);

        Ok(PresignedPut { url, headers })
    }
}

impl PresignedUrlMinter for S3Minter {
    fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
        signing_validity: Duration,
    ) -> Result<PresignedPut> {
        self.presign_put_at(OffsetDateTime::now_utc(), bucket, key, ttl, signing_validity)
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| Error::internal(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Percent-encodes for SigV4 canonical form.
///
/// Unreserved characters stay literal; `/` stays literal only in path
/// position. Hex digits are uppercase, as the canonical form requires.
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char);
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// `YYYYMMDD'T'HHMMSS'Z'` — the SigV4 timestamp form.
fn fmt_amz_date(at: OffsetDateTime) -> String {
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute(),
        at.second()
    )
}

/// RFC 7231 HTTP date, used for the signed `Expires` header.
fn fmt_http_date(at: OffsetDateTime) -> String {
    const DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    format!(
        "{}, {:02} {} {:04} {:02}:{:02}:{:02} GMT",
        DAYS[at.weekday().number_days_from_monday() as usize],
        at.day(),
        MONTHS[u8::from(at.month()) as usize - 1],
        at.year(),
        at.hour(),
        at.minute(),
        at.second()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minter() -> S3Minter {
        S3Minter::new("us-west-1", "AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
    }

    fn fixed_now() -> OffsetDateTime {
        // 2016-05-12T00:00:00Z
        OffsetDateTime::from_unix_timestamp(1_463_011_200).unwrap()
    }

    #[test]
    fn presigned_url_shape() {
        let put = minter()
            .presign_put_at(
                fixed_now(),
                "shares",
                "someObjectId",
                Duration::from_secs(240 * 60),
                Duration::from_secs(300),
            )
            .unwrap();

        assert!(put
            .url
            .starts_with("https://s3-us-west-1.amazonaws.com/shares/someObjectId?"));
        assert!(put.url.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
        assert!(put.url.contains("X-Amz-Date=20160512T000000Z"));
        assert!(put.url.contains("X-Amz-Expires=300"));
        assert!(put
            .url
            .contains("X-Amz-SignedHeaders=content-type%3Bexpires%3Bhost%3Bx-amz-acl"));

        let signature = put.url.rsplit("X-Amz-Signature=").next().unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn signing_is_deterministic() {
        let a = minter()
            .presign_put_at(
                fixed_now(),
                "shares",
                "meta/someObjectId",
                Duration::from_secs(60),
                Duration::from_secs(300),
            )
            .unwrap();
        let b = minter()
            .presign_put_at(
                fixed_now(),
                "shares",
                "meta/someObjectId",
                Duration::from_secs(60),
                Duration::from_secs(300),
            )
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn signed_headers_are_returned() {
        let put = minter()
            .presign_put_at(
                fixed_now(),
                "shares",
                "id",
                Duration::from_secs(60),
                Duration::from_secs(300),
            )
            .unwrap();
        assert_eq!(
            put.headers.get("Content-Type"),
            Some(&vec!["application/octet-stream".to_string()])
        );
        assert_eq!(
            put.headers.get("x-amz-acl"),
            Some(&vec!["public-read".to_string()])
        );
        assert!(put.headers.contains_key("Expires"));
    }

    #[test]
    fn http_date_format() {
        // 2016-05-12 was a Thursday.
        assert_eq!(fmt_http_date(fixed_now()), "Thu, 12 May 2016 00:00:00 GMT");
    }

    #[test]
    fn uri_encoding() {
        assert_eq!(uri_encode("a+b/c", false), "a%2Bb/c");
        assert_eq!(uri_encode("a+b/c", true), "a%2Bb%2Fc");
        assert_eq!(uri_encode("AKID/20160512/us-west-1", true), "AKID%2F20160512%2Fus-west-1");
    }
}

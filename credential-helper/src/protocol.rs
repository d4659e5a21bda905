//! Messages of the credential helper protocol and their JSON encoding.
//!
//! A credential helper is invoked as `<helper> get`, receives a
//! [`GetCredentialsRequest`] on its standard input and answers with a
//! [`GetCredentialsResponse`] on its standard output:
//!
//! ```text
//! request:  {"uri": "https://example.com/foo"}
//! response: {"headers": {"Authorization": ["Bearer abc"]}, "expires": "2023-10-01T12:00:00Z"}
//! ```
//!
//! Unknown fields are ignored when decoding, so helpers speaking a newer
//! revision of the protocol stay compatible.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Initial capacity of the buffer used by [`read_message`].
const READ_CHUNK_SIZE: usize = 4096;

/// Request for the `get` command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GetCredentialsRequest {
    /// The URI to get credentials for.
    pub uri: String,
}

impl GetCredentialsRequest {
    /// Creates a request for the given URI.
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

/// Response of the `get` command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetCredentialsResponse {
    /// Headers to add to every request sent to the URI.
    ///
    /// A header may carry more than one value.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub headers: BTreeMap<String, Vec<String>>,

    /// When the credentials stop being valid for new requests.
    ///
    /// Encoded as RFC 3339 with second precision; sub-second components are
    /// dropped on encoding because Bazel rejects them.
    #[serde(default, with = "rfc3339_seconds")]
    pub expires: Option<OffsetDateTime>,
}

impl GetCredentialsResponse {
    /// Creates a response with the given headers and no expiry.
    pub fn with_headers<I, K, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            headers: headers
                .into_iter()
                .map(|(name, values)| (name.into(), values.into_iter().map(Into::into).collect()))
                .collect(),
            expires: None,
        }
    }

    /// Sets the expiry of the credentials.
    #[must_use]
    pub fn expires_at(mut self, expires: OffsetDateTime) -> Self {
        self.expires = Some(expires);
        self
    }
}

/// Errors produced while encoding or decoding protocol messages.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The text is not valid JSON or ends before the message is complete.
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The text is valid JSON, but a known field has an invalid value or type.
    #[error("invalid message: {0}")]
    InvalidValue(#[source] serde_json::Error),

    /// There was no message at all.
    #[error("empty message")]
    Empty,

    /// The underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The message could not be encoded.
    #[error("failed encoding message: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ProtocolError {
    fn from_decode(err: serde_json::Error) -> Self {
        use serde_json::error::Category;

        match err.classify() {
            Category::Data => ProtocolError::InvalidValue(err),
            Category::Io => ProtocolError::Io(err.into()),
            Category::Syntax | Category::Eof => ProtocolError::Malformed(err),
        }
    }
}

/// Encodes a request.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_request(request: &GetCredentialsRequest) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(request).map_err(ProtocolError::Encode)
}

/// Decodes a request.
///
/// # Errors
///
/// Returns a [`ProtocolError`] if `bytes` is empty, not valid JSON, or does
/// not have the shape of a request.
pub fn decode_request(bytes: &[u8]) -> Result<GetCredentialsRequest, ProtocolError> {
    decode(bytes)
}

/// Encodes a response.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if `expires` cannot be represented as an
/// RFC 3339 timestamp.
pub fn encode_response(response: &GetCredentialsResponse) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(response).map_err(ProtocolError::Encode)
}

/// Decodes a response.
///
/// # Errors
///
/// Returns a [`ProtocolError`] if `bytes` is empty, not valid JSON, or a known
/// field holds an invalid value (for example an unparseable `expires`).
pub fn decode_response(bytes: &[u8]) -> Result<GetCredentialsResponse, ProtocolError> {
    decode(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ProtocolError::Empty);
    }
    serde_json::from_slice(bytes).map_err(ProtocolError::from_decode)
}

/// Decodes the first JSON value in `bytes`.
///
/// Returns `Ok(None)` while the buffer holds only a prefix of a value.
fn decode_prefix<T: DeserializeOwned>(bytes: &[u8]) -> Result<Option<T>, ProtocolError> {
    let mut values = serde_json::Deserializer::from_slice(bytes).into_iter::<T>();
    match values.next() {
        None => Ok(None),
        Some(Ok(value)) => Ok(Some(value)),
        Some(Err(err)) if err.is_eof() => Ok(None),
        Some(Err(err)) => Err(ProtocolError::from_decode(err)),
    }
}

/// Reads a single message from `reader`.
///
/// Returns as soon as one complete JSON value has been read, without waiting
/// for the end of the stream. Bytes following that value are left unread or
/// ignored.
///
/// # Errors
///
/// Returns [`ProtocolError::Empty`] if the stream ends before any content,
/// [`ProtocolError::Malformed`] if it ends in the middle of a value or holds
/// invalid JSON, and [`ProtocolError::InvalidValue`] if the value does not
/// have the expected shape.
pub async fn read_message<T, R>(reader: &mut R) -> Result<T, ProtocolError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = Vec::with_capacity(READ_CHUNK_SIZE);
    loop {
        let read = reader.read_buf(&mut buf).await?;
        if read == 0 {
            // End of stream: decode what we have to get the precise error.
            return decode(&buf);
        }
        if let Some(message) = decode_prefix(&buf)? {
            return Ok(message);
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, Vec<String>>>::deserialize(deserializer)?.unwrap_or_default())
}

/// `expires` codec: RFC 3339 without fractional seconds.
mod rfc3339_seconds {
    use serde::{de, ser, Deserialize, Deserializer, Serializer};
    use time::format_description::well_known::Rfc3339;
    use time::OffsetDateTime;

    pub(super) fn serialize<S>(
        expires: &Option<OffsetDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let Some(expires) = expires else {
            return serializer.serialize_none();
        };
        let formatted = expires
            .replace_nanosecond(0)
            .map_err(ser::Error::custom)?
            .format(&Rfc3339)
            .map_err(ser::Error::custom)?;
        serializer.serialize_some(&formatted)
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(value) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        OffsetDateTime::parse(&value, &Rfc3339)
            .map(Some)
            .map_err(|e| de::Error::custom(format_args!("invalid expires {value:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn headers(pairs: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(name, values)| {
                (
                    (*name).to_string(),
                    values.iter().map(|v| (*v).to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_decode_request() {
        let request = decode_request(br#"{"uri": "grpcs://example.com"}"#).unwrap();
        assert_eq!(request, GetCredentialsRequest::new("grpcs://example.com"));

        let request = decode_request(br#"{"uri": "grpcs://example.org"}"#).unwrap();
        assert_eq!(request, GetCredentialsRequest::new("grpcs://example.org"));
    }

    #[test]
    fn test_decode_request_with_extra_fields() {
        let request =
            decode_request(br#"{"foo": 1, "uri": "grpcs://example.com", "bar": 2}"#).unwrap();
        assert_eq!(request, GetCredentialsRequest::new("grpcs://example.com"));
    }

    #[test]
    fn test_decode_request_missing_uri() {
        let err = decode_request(br#"{"url": "grpcs://example.com"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidValue(_)));
    }

    #[test]
    fn test_encode_request() {
        let encoded = encode_request(&GetCredentialsRequest::new("https://x")).unwrap();
        assert_eq!(encoded, br#"{"uri":"https://x"}"#);
    }

    #[test]
    fn test_decode_response() {
        let response = decode_response(
            br#"
            {
                "headers": {
                    "header1": ["value1"],
                    "header2": ["value1", "value2"],
                    "header3": ["value1", "value2", "value3"]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(
            response.headers,
            headers(&[
                ("header1", &["value1"]),
                ("header2", &["value1", "value2"]),
                ("header3", &["value1", "value2", "value3"]),
            ])
        );
        assert_eq!(response.expires, None);
    }

    #[test]
    fn test_decode_response_with_extra_fields() {
        let response =
            decode_response(br#"{"foo": 1, "headers": {"foo": ["1"], "bar": ["2"]}, "bar": 2}"#)
                .unwrap();
        assert_eq!(
            response.headers,
            headers(&[("foo", &["1"]), ("bar", &["2"])])
        );
    }

    #[test]
    fn test_decode_response_with_expires() {
        let response = decode_response(
            br#"
            {
                "headers": {"header1": ["value1"]},
                "expires": "1970-09-28T23:46:29-12:00"
            }"#,
        )
        .unwrap();

        // Same instant, compared across offsets.
        assert_eq!(
            response.expires,
            Some(OffsetDateTime::from_unix_timestamp(23_456_789).unwrap())
        );
    }

    #[test]
    fn test_decode_response_with_invalid_expires() {
        let err = decode_response(br#"{"expires": "foo"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidValue(_)));
        assert!(err.to_string().contains("invalid expires"));
    }

    #[test]
    fn test_decode_response_null_fields() {
        let response = decode_response(br#"{"headers": null, "expires": null}"#).unwrap();
        assert_eq!(response, GetCredentialsResponse::default());
    }

    #[test]
    fn test_decode_response_wrong_header_type() {
        let err = decode_response(br#"{"headers": {"a": "b"}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidValue(_)));
    }

    #[test]
    fn test_decode_response_malformed() {
        let err = decode_response(br#"{"headers": {"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));

        let err = decode_response(b"not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_decode_response_empty() {
        assert!(matches!(decode_response(b""), Err(ProtocolError::Empty)));
        assert!(matches!(decode_response(b" \n"), Err(ProtocolError::Empty)));
    }

    #[test]
    fn test_encode_response_without_expires() {
        let response = GetCredentialsResponse::with_headers([("a", vec!["1", "2"])]);
        let encoded = encode_response(&response).unwrap();
        assert_eq!(encoded, br#"{"headers":{"a":["1","2"]},"expires":null}"#);
    }

    #[test]
    fn test_encode_response_truncates_subsecond_precision() {
        let response = GetCredentialsResponse::default()
            .expires_at(datetime!(2023-10-01 12:30:45.123_456_789 UTC));
        let encoded = String::from_utf8(encode_response(&response).unwrap()).unwrap();
        assert_eq!(encoded, r#"{"headers":{},"expires":"2023-10-01T12:30:45Z"}"#);
    }

    #[test]
    fn test_encode_response_keeps_offset() {
        let response =
            GetCredentialsResponse::default().expires_at(datetime!(1970-09-28 23:46:29 -12:00));
        let encoded = String::from_utf8(encode_response(&response).unwrap()).unwrap();
        assert!(encoded.contains(r#""expires":"1970-09-28T23:46:29-12:00""#));
    }

    #[test]
    fn test_response_round_trip() {
        let response = GetCredentialsResponse::with_headers([
            ("Authorization", vec!["Bearer abc"]),
            ("x-multi", vec!["1", "2", "3"]),
            ("x-empty", Vec::<&str>::new()),
        ])
        .expires_at(datetime!(2030-01-02 03:04:05 +02:00));

        let decoded = decode_response(&encode_response(&response).unwrap()).unwrap();
        assert_eq!(decoded, response);
    }

    #[tokio::test]
    async fn test_read_message_ignores_trailing_bytes() {
        let mut input: &[u8] = b"{\"uri\":\"https://x\"}\ntrailing garbage";
        let request: GetCredentialsRequest = read_message(&mut input).await.unwrap();
        assert_eq!(request, GetCredentialsRequest::new("https://x"));
    }

    #[tokio::test]
    async fn test_read_message_truncated() {
        let mut input: &[u8] = br#"{"uri": "https://"#;
        let result: Result<GetCredentialsRequest, _> = read_message(&mut input).await;
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_read_message_empty() {
        let mut input: &[u8] = b"";
        let result: Result<GetCredentialsResponse, _> = read_message(&mut input).await;
        assert!(matches!(result, Err(ProtocolError::Empty)));
    }

    #[tokio::test]
    async fn test_read_message_does_not_wait_for_end_of_stream() {
        let (mut reader, mut writer) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut writer, br#"{"headers": {}}"#)
            .await
            .unwrap();

        // `writer` is still open, so reaching the end of the stream would hang.
        let response: GetCredentialsResponse = read_message(&mut reader).await.unwrap();
        assert_eq!(response, GetCredentialsResponse::default());
        drop(writer);
    }
}

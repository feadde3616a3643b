// ============================================================================
// Transaction Record
// ============================================================================
//
// One captured request/response exchange. Records are shared between the
// capture engine and the registry through `RecordHandle`; the capture engine
// keeps filling in fields (result code, body, ...) after the record has been
// registered, so every mutable field sits behind an interior lock.
//
// ============================================================================

use super::SessionId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared handle to a record. The registry and its session index alias the
/// same allocation, so field updates are visible through either path.
pub type RecordHandle = Arc<TransactionRecord>;

#[derive(Debug, Clone, Default)]
struct RecordFields {
    result_code: Option<i32>,
    protocol: String,
    host: String,
    server_address: String,
    url: String,
    body: String,
    caching_info: String,
    content_type: String,
    request_headers: Vec<(String, String)>,
}

#[derive(Debug)]
pub struct TransactionRecord {
    sequence: OnceLock<u64>,
    session_id: SessionId,
    captured_at: DateTime<Utc>,
    fields: RwLock<RecordFields>,
}

impl TransactionRecord {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            sequence: OnceLock::new(),
            session_id,
            captured_at: Utc::now(),
            fields: RwLock::new(RecordFields::default()),
        }
    }

    /// Start building a record for the given session
    ///
    /// # Examples
    ///
    /// ```
    /// use pipetable::{SessionId, TransactionRecord};
    ///
    /// let record = TransactionRecord::builder(SessionId(7))
    ///     .protocol("HTTP/1.1")
    ///     .host("example.com")
    ///     .url("http://example.com/")
    ///     .build();
    ///
    /// assert_eq!(record.host(), "example.com");
    /// assert_eq!(record.sequence_number(), None);
    /// ```
    pub fn builder(session_id: SessionId) -> TransactionRecordBuilder {
        TransactionRecordBuilder {
            session_id,
            fields: RecordFields::default(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RecordFields> {
        self.fields.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RecordFields> {
        self.fields.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// 1-based number assigned by the registry; `None` until registered.
    pub fn sequence_number(&self) -> Option<u64> {
        self.sequence.get().copied()
    }

    /// Stamp the sequence number. Fails with the number already held when
    /// the record was registered before.
    pub(crate) fn assign_sequence(&self, sequence: u64) -> std::result::Result<(), u64> {
        self.sequence
            .set(sequence)
            .map_err(|_| self.sequence.get().copied().unwrap_or(sequence))
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn result_code(&self) -> Option<i32> {
        self.read().result_code
    }

    pub fn protocol(&self) -> String {
        self.read().protocol.clone()
    }

    pub fn host(&self) -> String {
        self.read().host.clone()
    }

    pub fn server_address(&self) -> String {
        self.read().server_address.clone()
    }

    pub fn url(&self) -> String {
        self.read().url.clone()
    }

    pub fn body(&self) -> String {
        self.read().body.clone()
    }

    pub fn caching_info(&self) -> String {
        self.read().caching_info.clone()
    }

    pub fn content_type(&self) -> String {
        self.read().content_type.clone()
    }

    /// Case-insensitive request header lookup. Returns the first match.
    pub fn header(&self, name: &str) -> Option<String> {
        self.read()
            .request_headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }

    pub fn set_result_code(&self, code: i32) {
        self.write().result_code = Some(code);
    }

    pub fn set_protocol(&self, protocol: impl Into<String>) {
        self.write().protocol = protocol.into();
    }

    pub fn set_host(&self, host: impl Into<String>) {
        self.write().host = host.into();
    }

    pub fn set_server_address(&self, address: impl Into<String>) {
        self.write().server_address = address.into();
    }

    pub fn set_url(&self, url: impl Into<String>) {
        self.write().url = url.into();
    }

    pub fn set_body(&self, body: impl Into<String>) {
        self.write().body = body.into();
    }

    pub fn set_caching_info(&self, caching: impl Into<String>) {
        self.write().caching_info = caching.into();
    }

    pub fn set_content_type(&self, content_type: impl Into<String>) {
        self.write().content_type = content_type.into();
    }

    pub fn add_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.write().request_headers.push((name.into(), value.into()));
    }

    /// Plain copy of every field, taken under a single read lock.
    pub fn view(&self) -> RecordView {
        let fields = self.read();
        RecordView {
            sequence_number: self.sequence_number(),
            session_id: self.session_id,
            captured_at: self.captured_at,
            result_code: fields.result_code,
            protocol: fields.protocol.clone(),
            host: fields.host.clone(),
            server_address: fields.server_address.clone(),
            url: fields.url.clone(),
            body: fields.body.clone(),
            caching_info: fields.caching_info.clone(),
            content_type: fields.content_type.clone(),
        }
    }
}

/// Consistent point-in-time copy of a record's fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordView {
    pub sequence_number: Option<u64>,
    pub session_id: SessionId,
    pub captured_at: DateTime<Utc>,
    pub result_code: Option<i32>,
    pub protocol: String,
    pub host: String,
    pub server_address: String,
    pub url: String,
    pub body: String,
    pub caching_info: String,
    pub content_type: String,
}

pub struct TransactionRecordBuilder {
    session_id: SessionId,
    fields: RecordFields,
}

impl TransactionRecordBuilder {
    pub fn result_code(mut self, code: i32) -> Self {
        self.fields.result_code = Some(code);
        self
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.fields.protocol = protocol.into();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.fields.host = host.into();
        self
    }

    pub fn server_address(mut self, address: impl Into<String>) -> Self {
        self.fields.server_address = address.into();
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.fields.url = url.into();
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.fields.body = body.into();
        self
    }

    pub fn caching_info(mut self, caching: impl Into<String>) -> Self {
        self.fields.caching_info = caching.into();
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.fields.content_type = content_type.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.request_headers.push((name.into(), value.into()));
        self
    }

    pub fn build(self) -> RecordHandle {
        Arc::new(TransactionRecord {
            sequence: OnceLock::new(),
            session_id: self.session_id,
            captured_at: Utc::now(),
            fields: RwLock::new(self.fields),
        })
    }
}

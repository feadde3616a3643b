use crate::core::TransactionRecord;
use std::fmt;

/// Fixed column schema of the transaction table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Sequence,
    Result,
    Protocol,
    Host,
    ServerIp,
    Url,
    Body,
    Caching,
    ContentType,
}

impl Column {
    pub const ALL: [Column; 9] = [
        Column::Sequence,
        Column::Result,
        Column::Protocol,
        Column::Host,
        Column::ServerIp,
        Column::Url,
        Column::Body,
        Column::Caching,
        Column::ContentType,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn from_index(index: usize) -> Option<Column> {
        Self::ALL.get(index).copied()
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn label(&self) -> &'static str {
        match self {
            Column::Sequence => "#",
            Column::Result => "Result",
            Column::Protocol => "Protocol",
            Column::Host => "Host",
            Column::ServerIp => "ServerIP",
            Column::Url => "URL",
            Column::Body => "Body",
            Column::Caching => "Caching",
            Column::ContentType => "Content-Type",
        }
    }

    /// Current value of this column for `record`.
    pub fn value_of(&self, record: &TransactionRecord) -> String {
        match self {
            Column::Sequence => record
                .sequence_number()
                .map(|n| n.to_string())
                .unwrap_or_default(),
            // Blank until the exchange completes.
            Column::Result => record
                .result_code()
                .map(|code| code.to_string())
                .unwrap_or_default(),
            Column::Protocol => record.protocol(),
            Column::Host => record.host(),
            Column::ServerIp => record.server_address(),
            Column::Url => record.url(),
            Column::Body => record.body(),
            Column::Caching => record.caching_info(),
            Column::ContentType => record.content_type(),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

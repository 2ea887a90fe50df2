use serde::{Deserialize, Serialize};

/// Per-request status code. `Success` (100) is the only success; every
/// other code is a failure with a category hint in its hundreds digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum RequestStatus {
    Unknown,
    NoError,
    Success,
    MissingRequestType,
    UnknownRequestType,
    GenericError,
    UnsupportedRequestBatchExecutionType,
    NotReady,
    MissingRequestField,
    MissingRequestData,
    InvalidRequestField,
    InvalidRequestFieldType,
    RequestFieldOutOfRange,
    RequestFieldEmpty,
    TooManyRequestFields,
    OutputRunning,
    OutputNotRunning,
    StudioModeActive,
    StudioModeNotActive,
    ResourceNotFound,
    ResourceAlreadyExists,
    InvalidResourceType,
    NotEnoughResources,
    InvalidResourceState,
    ResourceCreationFailed,
    ResourceActionFailed,
    RequestProcessingFailed,
    CannotAct,
    /// A code this client has no name for.
    Other(u16),
}

impl RequestStatus {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl From<u16> for RequestStatus {
    fn from(code: u16) -> Self {
        match code {
            0 => Self::Unknown,
            10 => Self::NoError,
            100 => Self::Success,
            203 => Self::MissingRequestType,
            204 => Self::UnknownRequestType,
            205 => Self::GenericError,
            206 => Self::UnsupportedRequestBatchExecutionType,
            207 => Self::NotReady,
            300 => Self::MissingRequestField,
            301 => Self::MissingRequestData,
            400 => Self::InvalidRequestField,
            401 => Self::InvalidRequestFieldType,
            402 => Self::RequestFieldOutOfRange,
            403 => Self::RequestFieldEmpty,
            404 => Self::TooManyRequestFields,
            500 => Self::OutputRunning,
            501 => Self::OutputNotRunning,
            505 => Self::StudioModeActive,
            506 => Self::StudioModeNotActive,
            600 => Self::ResourceNotFound,
            601 => Self::ResourceAlreadyExists,
            602 => Self::InvalidResourceType,
            603 => Self::NotEnoughResources,
            604 => Self::InvalidResourceState,
            700 => Self::ResourceCreationFailed,
            701 => Self::ResourceActionFailed,
            702 => Self::RequestProcessingFailed,
            703 => Self::CannotAct,
            other => Self::Other(other),
        }
    }
}

impl From<RequestStatus> for u16 {
    fn from(status: RequestStatus) -> Self {
        match status {
            RequestStatus::Unknown => 0,
            RequestStatus::NoError => 10,
            RequestStatus::Success => 100,
            RequestStatus::MissingRequestType => 203,
            RequestStatus::UnknownRequestType => 204,
            RequestStatus::GenericError => 205,
            RequestStatus::UnsupportedRequestBatchExecutionType => 206,
            RequestStatus::NotReady => 207,
            RequestStatus::MissingRequestField => 300,
            RequestStatus::MissingRequestData => 301,
            RequestStatus::InvalidRequestField => 400,
            RequestStatus::InvalidRequestFieldType => 401,
            RequestStatus::RequestFieldOutOfRange => 402,
            RequestStatus::RequestFieldEmpty => 403,
            RequestStatus::TooManyRequestFields => 404,
            RequestStatus::OutputRunning => 500,
            RequestStatus::OutputNotRunning => 501,
            RequestStatus::StudioModeActive => 505,
            RequestStatus::StudioModeNotActive => 506,
            RequestStatus::ResourceNotFound => 600,
            RequestStatus::ResourceAlreadyExists => 601,
            RequestStatus::InvalidResourceType => 602,
            RequestStatus::NotEnoughResources => 603,
            RequestStatus::InvalidResourceState => 604,
            RequestStatus::ResourceCreationFailed => 700,
            RequestStatus::ResourceActionFailed => 701,
            RequestStatus::RequestProcessingFailed => 702,
            RequestStatus::CannotAct => 703,
            RequestStatus::Other(other) => other,
        }
    }
}

/// Server-side policy for executing a batch. Forwarded as-is; the
/// client never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(into = "i8")]
pub enum RequestBatchExecutionType {
    /// Let the server decide.
    None,
    /// One request at a time, respecting frame pacing.
    #[default]
    SerialRealtime,
    /// One request per rendered frame.
    SerialFrame,
    /// Unordered.
    Parallel,
}

impl From<RequestBatchExecutionType> for i8 {
    fn from(execution_type: RequestBatchExecutionType) -> Self {
        match execution_type {
            RequestBatchExecutionType::None => -1,
            RequestBatchExecutionType::SerialRealtime => 0,
            RequestBatchExecutionType::SerialFrame => 1,
            RequestBatchExecutionType::Parallel => 2,
        }
    }
}

/// Disconnect reason the server reports through the WebSocket close
/// frame, distinct from transport-level close codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    UnknownReason,
    MessageDecodeError,
    MissingDataField,
    InvalidDataFieldType,
    InvalidDataFieldValue,
    UnknownOpCode,
    NotIdentified,
    AlreadyIdentified,
    AuthenticationFailed,
    UnsupportedRpcVersion,
    SessionInvalidated,
    UnsupportedFeature,
}

impl CloseCode {
    /// Maps a raw close code; only the 4000-range codes of this
    /// protocol are recognized.
    pub fn from_repr(code: u16) -> Option<Self> {
        match code {
            4000 => Some(Self::UnknownReason),
            4002 => Some(Self::MessageDecodeError),
            4003 => Some(Self::MissingDataField),
            4004 => Some(Self::InvalidDataFieldType),
            4005 => Some(Self::InvalidDataFieldValue),
            4006 => Some(Self::UnknownOpCode),
            4007 => Some(Self::NotIdentified),
            4008 => Some(Self::AlreadyIdentified),
            4009 => Some(Self::AuthenticationFailed),
            4010 => Some(Self::UnsupportedRpcVersion),
            4011 => Some(Self::SessionInvalidated),
            4012 => Some(Self::UnsupportedFeature),
            _ => None,
        }
    }
}

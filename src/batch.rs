//! Batched request execution.
//!
//! A [`Batch`] collects typed requests, goes out as one frame, and
//! comes back as one ordered result list. Per-element failures live in
//! the result map; the batch call itself only fails on session-level
//! problems.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use serde_json::Value as JsonValue;

use crate::error::Error;
use crate::protocol::status::{RequestBatchExecutionType, RequestStatus};
use crate::protocol::to_client::BatchResponseElement;
use crate::protocol::to_server::BatchRequestElement;
use crate::requests::ClientRequest;

/// Type-erased decoded response; [`BatchResults::take`] restores the
/// concrete type.
type ErasedResponse = Box<dyn Any + Send>;

type DecodeFn = fn(JsonValue) -> Result<ErasedResponse, serde_json::Error>;

fn decode_as<R: ClientRequest>(data: JsonValue) -> Result<ErasedResponse, serde_json::Error> {
    serde_json::from_value::<R::Response>(data).map(|response| Box::new(response) as ErasedResponse)
}

pub(crate) struct BatchEntry {
    pub(crate) id: Option<String>,
    pub(crate) request_type: &'static str,
    pub(crate) data: Option<JsonValue>,
    decode: DecodeFn,
}

impl BatchEntry {
    pub(crate) fn wire(&self) -> BatchRequestElement {
        BatchRequestElement {
            request_type: self.request_type.to_string(),
            request_id: self.id.clone(),
            request_data: self.data.clone(),
        }
    }
}

/// An ordered list of requests executed by the server under one policy.
pub struct Batch {
    execution_type: RequestBatchExecutionType,
    halt_on_failure: bool,
    entries: Vec<BatchEntry>,
}

impl Batch {
    pub fn new() -> Self {
        Self {
            execution_type: RequestBatchExecutionType::SerialRealtime,
            halt_on_failure: false,
            entries: Vec::new(),
        }
    }

    pub fn execution_type(mut self, execution_type: RequestBatchExecutionType) -> Self {
        self.execution_type = execution_type;
        self
    }

    /// Asks the server to stop after the first non-success; the result
    /// list is then a prefix of the request list.
    pub fn halt_on_failure(mut self, halt: bool) -> Self {
        self.halt_on_failure = halt;
        self
    }

    /// Queues a request. Sub-requests without an id are keyed by their
    /// discriminator in the result map, where repeated un-IDed requests
    /// of one type overwrite each other; supply ids when that matters.
    pub fn push<R: ClientRequest>(&mut self, id: Option<&str>, request: R) -> Result<(), Error> {
        let data = serde_json::to_value(&request).map_err(Error::Encode)?;
        self.entries.push(BatchEntry {
            id: id.map(str::to_string),
            request_type: R::NAME,
            data: match data {
                JsonValue::Null => None,
                other => Some(other),
            },
            decode: decode_as::<R>,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_parts(self) -> (RequestBatchExecutionType, bool, Vec<BatchEntry>) {
        (self.execution_type, self.halt_on_failure, self.entries)
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one sub-request.
pub enum BatchOutcome {
    /// Success status with the decoded response.
    Ok(ErasedResponse),
    /// Non-success status; `responseData` is left undecoded.
    Failed {
        code: RequestStatus,
        comment: Option<String>,
    },
    /// Success status whose data did not match the expected shape.
    DecodeError(serde_json::Error),
}

impl fmt::Debug for BatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchOutcome::Ok(_) => f.write_str("Ok(..)"),
            BatchOutcome::Failed { code, comment } => f
                .debug_struct("Failed")
                .field("code", code)
                .field("comment", comment)
                .finish(),
            BatchOutcome::DecodeError(e) => f.debug_tuple("DecodeError").field(e).finish(),
        }
    }
}

/// Per-element outcomes keyed by caller id, or by discriminator for
/// un-IDed sub-requests.
#[derive(Debug, Default)]
pub struct BatchResults {
    entries: HashMap<String, BatchOutcome>,
}

impl BatchResults {
    /// Removes the outcome for `id` and restores its response type.
    pub fn take<R: ClientRequest>(&mut self, id: &str) -> Option<Result<R::Response, Error>> {
        let outcome = self.entries.remove(id)?;
        Some(match outcome {
            BatchOutcome::Ok(erased) => erased
                .downcast::<R::Response>()
                .map(|response| *response)
                .map_err(|_| Error::ResponseTypeMismatch),
            BatchOutcome::Failed { code, comment } => Err(Error::RequestFailed { code, comment }),
            BatchOutcome::DecodeError(e) => Err(Error::ResponseDecode(e)),
        })
    }

    pub fn outcome(&self, id: &str) -> Option<&BatchOutcome> {
        self.entries.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pairs server results with the submitted entries. Results are
/// positional; under halt-on-failure the list may be a strict prefix of
/// the submission.
pub(crate) fn map_results(
    entries: &[BatchEntry],
    results: Vec<BatchResponseElement>,
) -> BatchResults {
    let mut out = BatchResults::default();

    for (entry, result) in entries.iter().zip(results) {
        let key = entry
            .id
            .clone()
            .unwrap_or_else(|| entry.request_type.to_string());

        let outcome = if result.request_status.result {
            match (entry.decode)(result.response_data.unwrap_or(JsonValue::Null)) {
                Ok(erased) => BatchOutcome::Ok(erased),
                Err(e) => BatchOutcome::DecodeError(e),
            }
        } else {
            BatchOutcome::Failed {
                code: result.request_status.code,
                comment: result.request_status.comment,
            }
        };

        out.entries.insert(key, outcome);
    }

    out
}

//! The unit of work accepted from the watcher.
//!
//! A [`ChangeItem`] pairs the previous and current representation of one
//! observed resource. The sink never looks inside the resource; it only
//! serializes it.

use serde::Deserialize;
use serde::Serialize;
use serde::Serializer;

use crate::SinkError;

/// Kind of change, derived from which halves of the pair are present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeVerb {
    Added,
    Updated,
    Deleted,
}

/// One `(previous, current)` observation of a watched resource.
///
/// Immutable once created. Serialized on the wire as
/// `{"verb": "...", "current": ..., "previous": ...}` with absent halves
/// omitted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChangeItem<R> {
    #[serde(default = "Option::default")]
    previous: Option<R>,
    #[serde(default = "Option::default")]
    current: Option<R>,
}

impl<R> ChangeItem<R> {
    pub fn new(
        previous: Option<R>,
        current: Option<R>,
    ) -> Self {
        Self { previous, current }
    }

    pub fn previous(&self) -> Option<&R> {
        self.previous.as_ref()
    }

    pub fn current(&self) -> Option<&R> {
        self.current.as_ref()
    }

    pub fn verb(&self) -> ChangeVerb {
        match (&self.previous, &self.current) {
            (None, Some(_)) => ChangeVerb::Added,
            (Some(_), None) => ChangeVerb::Deleted,
            _ => ChangeVerb::Updated,
        }
    }
}

impl<R: Serialize> ChangeItem<R> {
    /// JSON body carried by the transport message
    pub fn to_json_bytes(&self) -> std::result::Result<Vec<u8>, SinkError> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[derive(Serialize)]
struct WireChangeItem<'a, R> {
    verb: ChangeVerb,
    #[serde(skip_serializing_if = "Option::is_none")]
    current: Option<&'a R>,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous: Option<&'a R>,
}

impl<R: Serialize> Serialize for ChangeItem<R> {
    fn serialize<S>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        WireChangeItem {
            verb: self.verb(),
            current: self.current.as_ref(),
            previous: self.previous.as_ref(),
        }
        .serialize(serializer)
    }
}

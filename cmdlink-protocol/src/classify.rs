/// Verdict of a [`Classifier`] over the bytes accumulated so far.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Verdict {
    /// More bytes are needed before success or failure can be decided.
    Insufficient,
    /// The bytes demarcate a failure. Reading stops.
    Failure,
    /// The bytes demarcate an accepted response. Reading stops.
    Success,
}

/// Decides whether an accumulated response is complete.
///
/// The classifier always receives the complete buffer accumulated during an exchange,
/// not only the bytes of the latest read, since markers may be split across reads.
pub trait Classifier: Send + 'static {
    fn classify(&self, accumulated: &[u8]) -> Verdict;
}

/// Substring criteria for simple exchanges.
///
/// The failure marker is checked first, so if both markers are present in
/// the accumulated bytes the exchange fails. Absent or empty markers never match.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Markers {
    success: Option<Box<[u8]>>,
    failure: Option<Box<[u8]>>,
}

impl Markers {
    pub fn new(success: Option<&[u8]>, failure: Option<&[u8]>) -> Markers {
        let keep = |marker: Option<&[u8]>| marker.filter(|m| !m.is_empty()).map(Box::from);
        Markers {
            success: keep(success),
            failure: keep(failure),
        }
    }

    pub fn success(&self) -> Option<&[u8]> {
        self.success.as_deref()
    }

    pub fn failure(&self) -> Option<&[u8]> {
        self.failure.as_deref()
    }
}

impl Classifier for Markers {
    fn classify(&self, accumulated: &[u8]) -> Verdict {
        if self
            .failure
            .as_deref()
            .is_some_and(|marker| contains(accumulated, marker))
        {
            return Verdict::Failure;
        }
        if self
            .success
            .as_deref()
            .is_some_and(|marker| contains(accumulated, marker))
        {
            return Verdict::Success;
        }
        Verdict::Insufficient
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

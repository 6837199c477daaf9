//! Per-transfer progress record, owned by one engine run.

use crate::edc::Edc;

/// How a successfully decoded block relates to the receiver's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// The next block in order; deliver it.
    Next,
    /// A resend of the block accepted last; its ACK was lost.
    Duplicate,
    /// Anything else; the two sides no longer agree on progress.
    OutOfSequence,
}

/// State for one directed transfer. Created at the start of a logical
/// transfer and dropped at its end, never reused.
#[derive(Debug)]
pub(crate) struct Session {
    edc: Edc,
    expected_sequence: u8,
    last_accepted_sequence: u8,
    error_count: u32,
    max_errors: u32,
}

impl Session {
    /// Session expecting `first_sequence` next.
    pub fn new(edc: Edc, first_sequence: u8, max_errors: u32) -> Self {
        Self {
            edc,
            expected_sequence: first_sequence,
            last_accepted_sequence: first_sequence.wrapping_sub(1),
            error_count: 0,
            max_errors,
        }
    }

    pub fn edc(&self) -> Edc {
        self.edc
    }

    pub fn expected_sequence(&self) -> u8 {
        self.expected_sequence
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    /// Classify a structurally valid, EDC-valid block. Any such block resets
    /// the consecutive error count.
    pub fn classify(&mut self, sequence: u8) -> Arrival {
        self.error_count = 0;
        if sequence == self.expected_sequence {
            Arrival::Next
        } else if sequence == self.last_accepted_sequence {
            Arrival::Duplicate
        } else {
            Arrival::OutOfSequence
        }
    }

    /// Record delivery of the expected block and move on to the next one.
    pub fn accept(&mut self) {
        self.last_accepted_sequence = self.expected_sequence;
        self.expected_sequence = self.expected_sequence.wrapping_add(1);
    }

    /// Count one failure. Returns true once the maximum has been reached.
    pub fn record_error(&mut self) -> bool {
        self.error_count += 1;
        self.error_count >= self.max_errors
    }

    pub fn reset_errors(&mut self) {
        self.error_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_session_treats_header_resend_as_duplicate() {
        let mut session = Session::new(Edc::Crc16, 1, 10);
        assert_eq!(session.classify(0), Arrival::Duplicate);
        assert_eq!(session.classify(1), Arrival::Next);
        session.accept();
        assert_eq!(session.classify(1), Arrival::Duplicate);
        assert_eq!(session.classify(2), Arrival::Next);
        assert_eq!(session.classify(4), Arrival::OutOfSequence);
    }

    #[test]
    fn sequence_wraps() {
        let mut session = Session::new(Edc::Checksum, 255, 10);
        assert_eq!(session.classify(255), Arrival::Next);
        session.accept();
        assert_eq!(session.expected_sequence(), 0);
        assert_eq!(session.classify(255), Arrival::Duplicate);
        assert_eq!(session.classify(0), Arrival::Next);
    }

    #[test]
    fn error_limit_reached_on_the_last_allowed_error() {
        let mut session = Session::new(Edc::Crc16, 1, 3);
        assert!(!session.record_error());
        assert!(!session.record_error());
        assert!(session.record_error());
        assert_eq!(session.error_count(), 3);

        session.classify(1);
        assert_eq!(session.error_count(), 0);
    }
}

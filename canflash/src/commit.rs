//! Firmware commit broadcasts.
//!
//! Running applications periodically broadcast the git commit they were
//! built from. Payload layout:
//!
//! ```text
//! +---------------------------+-----+-------+
//! | commit word (u32, LE)     | ... | clean |
//! +---------------------------+-----+-------+
//!   bytes 0..4                        last byte, 0x01 = clean tree
//! ```
//!
//! The short hash is the low 28 bits of the commit word as seven hex digits.

use crate::error::Result;
use crate::protocol::{Verdict, WaitOutcome, wait_for_frame};
use crate::target::CommitSource;
use crate::transport::{Frame, Transport};
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info};
use std::fmt;
use std::time::{Duration, Instant};

/// Commit a board reported.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommitInfo {
    /// Board name.
    pub board: String,
    /// Seven-digit abbreviated commit hash.
    pub short_sha: String,
    /// Built from a clean working tree.
    pub clean: bool,
}

impl CommitInfo {
    /// Decode a commit broadcast from `board`.
    ///
    /// Returns `None` for payloads too short to carry a commit word.
    pub fn decode(board: &str, frame: &Frame) -> Option<Self> {
        let data = frame.data();
        if data.len() < 4 {
            return None;
        }
        let word = LittleEndian::read_u32(&data[..4]);
        Some(Self {
            board: board.to_string(),
            short_sha: format!("{:07x}", word & 0x0FFF_FFFF),
            clean: data.last() == Some(&0x01),
        })
    }
}

impl fmt::Display for CommitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({})",
            self.board,
            self.short_sha,
            if self.clean { "Clean" } else { "Dirty" }
        )
    }
}

/// Listen until every source has reported once or `timeout` runs out.
///
/// Results come back in the order of `sources`; boards that stayed silent
/// are missing from the list.
pub fn collect_commits<T>(
    transport: &mut T,
    sources: &[CommitSource],
    timeout: Duration,
    poll: Duration,
) -> Result<Vec<CommitInfo>>
where
    T: Transport + ?Sized,
{
    let start = Instant::now();
    let mut found: Vec<Option<CommitInfo>> = vec![None; sources.len()];

    while found.iter().any(Option::is_none) {
        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            break;
        }

        let outcome = wait_for_frame(transport, remaining, poll, |frame| {
            let waiting = sources
                .iter()
                .zip(&found)
                .any(|(s, f)| s.can_id == frame.id() && f.is_none());
            if waiting { Verdict::Accept } else { Verdict::Reject }
        })?;
        let WaitOutcome::Accepted(frame) = outcome else {
            break;
        };

        if let Some(idx) = sources.iter().position(|s| s.can_id == frame.id()) {
            match CommitInfo::decode(sources[idx].board, &frame) {
                Some(info) => {
                    info!("{info}");
                    found[idx] = Some(info);
                },
                None => debug!("Short commit frame {frame} from {}", sources[idx].board),
            }
        }
    }

    Ok(found.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::COMMIT_SOURCES;
    use crate::transport::mock::MockBus;

    fn commit_frame(id: u16, word: u32, clean: bool) -> Frame {
        let mut payload = word.to_le_bytes().to_vec();
        payload.push(u8::from(clean));
        Frame::new(id, &payload).unwrap()
    }

    #[test]
    fn test_decode_short_sha() {
        let info = CommitInfo::decode("VC", &commit_frame(204, 0x0a1b_2c3d, true)).unwrap();
        assert_eq!(info.short_sha, "a1b2c3d");
        assert!(info.clean);
        assert_eq!(info.to_string(), "VC: a1b2c3d (Clean)");
    }

    #[test]
    fn test_decode_keeps_leading_zeros_and_dirty_flag() {
        let info = CommitInfo::decode("FSM", &commit_frame(302, 0xF000_0042, false)).unwrap();
        assert_eq!(info.short_sha, "0000042");
        assert!(!info.clean);
    }

    #[test]
    fn test_decode_rejects_short_payload() {
        assert!(CommitInfo::decode("BMS", &Frame::new(140, &[1, 2]).unwrap()).is_none());
    }

    #[test]
    fn test_collect_stops_when_all_reported() {
        let sources = &COMMIT_SOURCES[..2];
        let mut bus = MockBus::new();
        bus.push_incoming(Frame::empty(0x7FF).unwrap());
        bus.push_incoming(commit_frame(506, 2, true));
        bus.push_incoming(commit_frame(506, 3, true));
        bus.push_incoming(commit_frame(140, 1, false));
        bus.push_incoming(commit_frame(819, 4, true));

        let commits = collect_commits(
            &mut bus,
            sources,
            Duration::from_millis(200),
            Duration::from_millis(10),
        )
        .unwrap();

        let boards: Vec<_> = commits.iter().map(|c| c.board.as_str()).collect();
        assert_eq!(boards, ["BMS", "CRIT"]);
        assert_eq!(commits[1].short_sha, "0000002");
        assert_eq!(bus.pending_incoming(), 1);
    }

    #[test]
    fn test_collect_times_out_with_partial_results() {
        let mut bus = MockBus::new();
        bus.push_incoming(commit_frame(204, 0x1234_5678, true));

        let commits = collect_commits(
            &mut bus,
            COMMIT_SOURCES,
            Duration::from_millis(40),
            Duration::from_millis(10),
        )
        .unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].board, "VC");
        assert_eq!(commits[0].short_sha, "2345678");
    }
}

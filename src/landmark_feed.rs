// src/landmark_feed.rs - Frames from an external hand tracker, one JSON object per line
use crate::tracking::{HandObservation, HAND_LANDMARK_COUNT};
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

pub const ESCAPE: char = '\u{1b}';

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line}: hand has {count} landmarks, expected 21")]
    LandmarkCount { line: usize, count: usize },
    #[error("reading frame feed: {0}")]
    Io(#[from] std::io::Error),
}

/// One camera frame as seen by the hand tracker.
///
/// ```json
/// {"width": 960, "height": 540, "key": "k",
///  "hands": [{"handedness": "Right", "landmarks": [[412, 300], ...]}]}
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrameRecord {
    #[serde(default)]
    pub hands: Vec<HandObservation>,
    #[serde(default)]
    pub key: Option<char>,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
}

impl FrameRecord {
    pub fn is_quit(&self) -> bool {
        matches!(self.key, Some('q') | Some(ESCAPE))
    }
}

pub fn parse_frame(line_no: usize, line: &str) -> Result<FrameRecord, FeedError> {
    let frame: FrameRecord = serde_json::from_str(line).map_err(|source| FeedError::Malformed {
        line: line_no,
        source,
    })?;
    if let Some(hand) = frame
        .hands
        .iter()
        .find(|h| h.landmarks.len() != HAND_LANDMARK_COUNT)
    {
        return Err(FeedError::LandmarkCount {
            line: line_no,
            count: hand.landmarks.len(),
        });
    }
    Ok(frame)
}

pub struct LandmarkFeed<R> {
    lines: Lines<R>,
    line_no: usize,
}

impl<R: AsyncBufRead + Unpin> LandmarkFeed<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }

    /// Next frame, `Ok(None)` at end of feed. Blank lines are skipped.
    pub async fn next_frame(&mut self) -> Result<Option<FrameRecord>, FeedError> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            return parse_frame(self.line_no, &line).map(Some);
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::Handedness;

    fn hand_json(points: usize) -> String {
        let landmarks: Vec<String> = (0..points).map(|i| format!("[{i}, {}]", i * 2)).collect();
        format!(
            r#"{{"handedness": "Left", "landmarks": [{}]}}"#,
            landmarks.join(",")
        )
    }

    #[test]
    fn parses_hand_and_key() {
        let line = format!(r#"{{"key": "k", "width": 640, "hands": [{}]}}"#, hand_json(21));
        let frame = parse_frame(1, &line).expect("frame");
        assert_eq!(frame.key, Some('k'));
        assert_eq!(frame.width, Some(640.0));
        assert_eq!(frame.height, None);
        assert_eq!(frame.hands.len(), 1);
        assert_eq!(frame.hands[0].handedness, Handedness::Left);
        assert_eq!(frame.hands[0].landmarks[8].x, 8.0);
        assert_eq!(frame.hands[0].landmarks[8].y, 16.0);
    }

    #[test]
    fn empty_object_is_a_frame_without_hands() {
        let frame = parse_frame(3, "{}").expect("frame");
        assert!(frame.hands.is_empty());
        assert!(!frame.is_quit());
    }

    #[test]
    fn rejects_bad_records() {
        assert!(matches!(parse_frame(2, "not json"), Err(FeedError::Malformed { line: 2, .. })));
        let short = format!(r#"{{"hands": [{}]}}"#, hand_json(5));
        assert!(matches!(
            parse_frame(4, &short),
            Err(FeedError::LandmarkCount { line: 4, count: 5 })
        ));
    }

    #[tokio::test]
    async fn feed_reads_until_end() {
        let input = "{}\n\n{\"key\": \"q\"}\n";
        let mut feed = LandmarkFeed::new(input.as_bytes());

        let first = feed.next_frame().await.expect("first").expect("some");
        assert!(first.hands.is_empty());
        let second = feed.next_frame().await.expect("second").expect("some");
        assert!(second.is_quit());
        assert!(feed.next_frame().await.expect("end").is_none());
    }
}

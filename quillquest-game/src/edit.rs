use crate::constants::DEFAULT_NEW_STAGE_MINUTES;
use crate::sequencer::{CursorMark, StageSequencer};
use crate::stage::{StageDefinition, mint_stage_id};

/// Leading-integer parse of prompt input; blank, garbage, negative or zero
/// input yields `default`.
#[must_use]
pub fn parse_positive(input: &str, default: u32) -> u32 {
    let digits: String = input
        .trim()
        .trim_start_matches('+')
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    match digits.parse::<u32>() {
        Ok(0) | Err(_) => default,
        Ok(value) => value,
    }
}

/// Snapshot held while the stage list is being edited.
///
/// Dropping the session commits; [`EditSession::rollback`] puts the list and
/// the cursor back as they were on entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    snapshot: Vec<StageDefinition>,
    mark: CursorMark,
    cursor_moved: bool,
}

impl EditSession {
    #[must_use]
    pub fn begin(sequencer: &StageSequencer) -> Self {
        Self {
            snapshot: sequencer.stages().to_vec(),
            mark: sequencer.mark(),
            cursor_moved: false,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> &[StageDefinition] {
        &self.snapshot
    }

    /// Record that an edit re-entered, resized or emptied the active stage.
    pub const fn cursor_moved(&mut self) {
        self.cursor_moved = true;
    }

    /// Restore the entry snapshot into `sequencer`.
    ///
    /// If the edits disturbed the active stage, its countdown goes back to
    /// the value it had on entry.
    pub fn rollback(self, sequencer: &mut StageSequencer) {
        sequencer.restore_stages(self.snapshot, &self.mark, self.cursor_moved);
    }

    /// Build the stage an "add stage" prompt pair describes.
    ///
    /// A cancelled or blank label aborts; a bad duration falls back to ten
    /// minutes.
    #[must_use]
    pub fn draft_stage(
        label: Option<&str>,
        minutes: Option<&str>,
        now_millis: i64,
        existing: &[StageDefinition],
    ) -> Option<StageDefinition> {
        let label = label.map(str::trim).filter(|l| !l.is_empty())?;
        let minutes = minutes.map_or(DEFAULT_NEW_STAGE_MINUTES, |raw| {
            parse_positive(raw, DEFAULT_NEW_STAGE_MINUTES)
        });
        let id = mint_stage_id(label, now_millis, existing);
        Some(StageDefinition::timed(id, label, minutes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::Phase;

    fn three_stages() -> StageSequencer {
        StageSequencer::new(vec![
            StageDefinition::timed("a", "A", 1),
            StageDefinition::timed("b", "B", 2),
            StageDefinition::timed("c", "C", 3),
        ])
    }

    fn advance_into_b(seq: &mut StageSequencer) {
        seq.start();
        for _ in 0..70 {
            seq.tick();
        }
        assert_eq!((seq.index(), seq.time_left()), (1, 110));
    }

    #[test]
    fn prompt_numbers_parse_leniently() {
        assert_eq!(parse_positive("25", 10), 25);
        assert_eq!(parse_positive(" 12 minutes", 10), 12);
        assert_eq!(parse_positive("", 10), 10);
        assert_eq!(parse_positive("abc", 10), 10);
        assert_eq!(parse_positive("0", 3), 3);
        assert_eq!(parse_positive("-4", 3), 3);
    }

    #[test]
    fn draft_stage_aborts_on_blank_label() {
        assert!(EditSession::draft_stage(None, Some("5"), 1, &[]).is_none());
        assert!(EditSession::draft_stage(Some("   "), Some("5"), 1, &[]).is_none());

        let stage = EditSession::draft_stage(Some("Deep Work"), Some("x"), 99, &[]).unwrap();
        assert_eq!(stage.id, "deep-work-99");
        assert_eq!(stage.minutes(), 10);
    }

    #[test]
    fn rollback_returns_entry_snapshot() {
        let mut seq = three_stages();
        let session = EditSession::begin(&seq);
        seq.remove_stage("b");
        session.rollback(&mut seq);
        assert_eq!(seq, three_stages());
    }

    #[test]
    fn rollback_follows_the_live_stage_by_id() {
        let mut seq = three_stages();
        advance_into_b(&mut seq);
        let session = EditSession::begin(&seq);
        seq.remove_stage("a");
        seq.tick();
        assert_eq!((seq.index(), seq.time_left()), (0, 109));

        session.rollback(&mut seq);
        assert_eq!(seq.current_stage().unwrap().id, "b");
        assert_eq!((seq.index(), seq.time_left()), (1, 109));
        assert_eq!(seq.stages().len(), 3);
    }

    #[test]
    fn rollback_rewinds_a_disturbed_active_stage() {
        let mut seq = three_stages();
        advance_into_b(&mut seq);
        let mut session = EditSession::begin(&seq);
        seq.remove_stage("a");
        seq.remove_stage("b");
        session.cursor_moved();
        assert_eq!(seq.current_stage().unwrap().id, "c");
        assert_eq!(seq.time_left(), 180);

        session.rollback(&mut seq);
        assert_eq!(seq.current_stage().unwrap().id, "b");
        assert_eq!((seq.index(), seq.time_left()), (1, 110));
        assert_eq!(seq.phase(), Phase::Running);
    }
}

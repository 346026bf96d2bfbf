//! Action resolution: de-duplication ledger and phase gating.
//!
//! Every mutating action carries a client-supplied action id. The ledger
//! records each resolved action exactly once; a replayed id returns the
//! recorded outcome verbatim without re-applying any effect, so network
//! retries are harmless.

use std::collections::HashMap;

use crate::arena::{ActionId, ActionRecord, Arena, ArenaPhase, Participant, ParticipantId};
use crate::modes::{ModeEngine, RejectReason};

/// Append-only audit trail with an id index for O(1) replay lookups.
#[derive(Debug, Default)]
pub struct ActionLedger {
    records: Vec<ActionRecord>,
    memo: HashMap<ActionId, usize>,
}

impl ActionLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded outcome for an already-seen action id.
    #[must_use]
    pub fn lookup(&self, action_id: &ActionId) -> Option<&ActionRecord> {
        self.memo.get(action_id).map(|&i| &self.records[i])
    }

    /// Appends a resolved action. The first record for an id wins; a
    /// second record for the same id is ignored.
    pub fn record(&mut self, record: ActionRecord) {
        if self.memo.contains_key(&record.action_id) {
            return;
        }
        self.memo.insert(record.action_id.clone(), self.records.len());
        self.records.push(record);
    }

    /// All records in arrival order.
    #[must_use]
    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    /// Number of resolved actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no action has been resolved yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Checks whether a participant may act right now.
///
/// Read queries pass in every phase. Mutating actions require a running
/// match (`Started` or `Grace`), an active membership, and an unfinished
/// participant.
pub fn gate(
    arena: &Arena,
    participant: Option<&Participant>,
    engine: Option<&dyn ModeEngine>,
    id: &ParticipantId,
    is_query: bool,
) -> Result<(), RejectReason> {
    let Some(participant) = participant else {
        return Err(RejectReason::NotParticipant);
    };
    if is_query {
        return Ok(());
    }
    if !participant.is_active() {
        return Err(RejectReason::NotParticipant);
    }
    match arena.phase {
        ArenaPhase::Started | ArenaPhase::Grace => {}
        ArenaPhase::Waiting => {
            return Err(RejectReason::PhaseForbids { phase: arena.phase });
        }
        ArenaPhase::Ended => return Err(RejectReason::SessionEnded),
    }
    if engine.is_some_and(|e| e.is_finished(id)) {
        return Err(RejectReason::AlreadyComplete);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{ArenaId, ArenaSettings};
    use crate::modes::ActionOutcome;
    use crate::scenario::schema::{Difficulty, ModeKind};

    fn arena(phase: ArenaPhase) -> Arena {
        Arena {
            id: ArenaId::new("a1"),
            mode: ModeKind::Forensics,
            difficulty: Difficulty::Medium,
            max_participants: 4,
            phase,
            host: ParticipantId::new("host"),
            settings: ArenaSettings::default(),
            started_at_ms: None,
            ends_at_ms: None,
            grace_deadline_ms: None,
            scenario_id: "s1".to_string(),
        }
    }

    fn participant(left: bool) -> Participant {
        Participant {
            id: ParticipantId::new("u1"),
            display_name: "u1".to_string(),
            joined_at_ms: 0,
            ready: true,
            left,
            completed_at_ms: None,
        }
    }

    fn record(id: &str) -> ActionRecord {
        ActionRecord {
            action_id: ActionId::new(id),
            participant: ParticipantId::new("u1"),
            kind: "attack".to_string(),
            at_ms: 0,
            outcome: ActionOutcome::accepted(vec![]),
        }
    }

    #[test]
    fn test_ledger_replays_first_record() {
        let mut ledger = ActionLedger::new();
        ledger.record(record("act-1"));

        let mut duplicate = record("act-1");
        duplicate.kind = "defend".to_string();
        ledger.record(duplicate);

        assert_eq!(ledger.len(), 1);
        let replay = ledger.lookup(&ActionId::new("act-1")).unwrap();
        assert_eq!(replay.kind, "attack");
    }

    #[test]
    fn test_ledger_lookup_miss() {
        let ledger = ActionLedger::new();
        assert!(ledger.lookup(&ActionId::new("nope")).is_none());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_gate_rejects_non_participant() {
        let result = gate(
            &arena(ArenaPhase::Started),
            None,
            None,
            &ParticipantId::new("stranger"),
            false,
        );
        assert_eq!(result, Err(RejectReason::NotParticipant));
    }

    #[test]
    fn test_gate_rejects_mutation_in_waiting() {
        let p = participant(false);
        let result = gate(&arena(ArenaPhase::Waiting), Some(&p), None, &p.id, false);
        assert_eq!(
            result,
            Err(RejectReason::PhaseForbids {
                phase: ArenaPhase::Waiting
            })
        );
    }

    #[test]
    fn test_gate_rejects_mutation_after_end() {
        let p = participant(false);
        let result = gate(&arena(ArenaPhase::Ended), Some(&p), None, &p.id, false);
        assert_eq!(result, Err(RejectReason::SessionEnded));
    }

    #[test]
    fn test_gate_allows_queries_in_every_phase() {
        let p = participant(false);
        for phase in [
            ArenaPhase::Waiting,
            ArenaPhase::Started,
            ArenaPhase::Grace,
            ArenaPhase::Ended,
        ] {
            assert_eq!(gate(&arena(phase), Some(&p), None, &p.id, true), Ok(()));
        }
    }

    #[test]
    fn test_gate_rejects_departed_participant() {
        let p = participant(true);
        let result = gate(&arena(ArenaPhase::Started), Some(&p), None, &p.id, false);
        assert_eq!(result, Err(RejectReason::NotParticipant));
    }

    #[test]
    fn test_gate_allows_grace_mutations() {
        let p = participant(false);
        assert_eq!(
            gate(&arena(ArenaPhase::Grace), Some(&p), None, &p.id, false),
            Ok(())
        );
    }
}

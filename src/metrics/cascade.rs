use std::collections::BTreeMap;

use tracing::warn;

use crate::error::{EvalError, EvalResult};
use crate::model::{NextStep, TurnPositions};

use super::aggregate::ratio;

#[derive(Debug, Clone, Copy)]
pub struct TurnSignals<'a> {
    pub intent: &'a [bool],
    pub nextstep: &'a [bool],
    pub utterance: &'a [bool],
    pub action_value: &'a [bool],
    pub nextstep_labels: &'a [i64],
}

impl TurnSignals<'_> {
    fn len(&self) -> usize {
        self.nextstep_labels.len()
    }

    fn ensure_aligned(&self) -> EvalResult<()> {
        let expected = self.len();
        let fields = [
            ("intent matches", self.intent.len()),
            ("nextstep matches", self.nextstep.len()),
            ("utterance matches", self.utterance.len()),
            ("action/value matches", self.action_value.len()),
        ];
        for (field, found) in fields {
            if found != expected {
                return Err(EvalError::shape(field, expected, found));
            }
        }
        Ok(())
    }
}

// Respond turns need the top utterance, action turns the action/value pair.
pub fn turn_correctness(signals: &TurnSignals<'_>) -> EvalResult<Vec<bool>> {
    signals.ensure_aligned()?;

    let mut correct = Vec::with_capacity(signals.len());
    for (turn, label) in signals.nextstep_labels.iter().enumerate() {
        let classified = signals.intent[turn] && signals.nextstep[turn];
        let payload = match NextStep::from_label(*label) {
            Some(NextStep::Respond) => signals.utterance[turn],
            Some(NextStep::TakeAction) => signals.action_value[turn],
            Some(NextStep::EndConversation) => true,
            None => false,
        };
        correct.push(classified && payload);
    }
    Ok(correct)
}

// Turn indices may skip values; only their order matters.
pub fn group_conversations(
    positions: &TurnPositions,
    correct: &[bool],
) -> EvalResult<BTreeMap<i64, Vec<bool>>> {
    if positions.conversation_ids.len() != correct.len() {
        return Err(EvalError::shape(
            "conversation ids",
            correct.len(),
            positions.conversation_ids.len(),
        ));
    }
    if positions.turn_counts.len() != correct.len() {
        return Err(EvalError::shape(
            "turn counts",
            correct.len(),
            positions.turn_counts.len(),
        ));
    }

    let mut grouped = BTreeMap::<i64, Vec<(i64, bool)>>::new();
    for ((conversation_id, turn_index), is_correct) in positions
        .conversation_ids
        .iter()
        .zip(&positions.turn_counts)
        .zip(correct)
    {
        grouped
            .entry(*conversation_id)
            .or_default()
            .push((*turn_index, *is_correct));
    }

    let mut conversations = BTreeMap::new();
    for (conversation_id, mut turns) in grouped {
        turns.sort_by_key(|(turn_index, _)| *turn_index);
        if turns.windows(2).any(|pair| pair[0].0 == pair[1].0) {
            warn!(
                conversation_id,
                "duplicate turn index within conversation; keeping input order"
            );
        }
        conversations.insert(
            conversation_id,
            turns.into_iter().map(|(_, is_correct)| is_correct).collect(),
        );
    }
    Ok(conversations)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConversationScore {
    pub streak_starts: usize,
    pub score_sum: f64,
}

// Each run of correct turns scores its length over the turns left from its start.
pub fn score_conversation(correct: &[bool]) -> ConversationScore {
    let length = correct.len();
    let mut score = ConversationScore::default();

    let mut position = 0;
    while position < length {
        let remaining = length - position;
        let streak = correct[position..]
            .iter()
            .take_while(|is_correct| **is_correct)
            .count();

        if streak == 0 {
            position += 1;
            continue;
        }

        score.streak_starts += 1;
        score.score_sum += streak as f64 / remaining as f64;
        position += streak;
    }
    score
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeScore {
    pub turn_accuracy: f64,
    pub cascading_score: f64,
    pub conversation_count: usize,
    pub turn_count: usize,
}

pub fn cascade_score(positions: &TurnPositions, correct: &[bool]) -> EvalResult<CascadeScore> {
    let conversations = group_conversations(positions, correct)?;

    let mut streak_starts = 0_usize;
    let mut score_sum = 0.0_f64;
    for turns in conversations.values() {
        let conversation = score_conversation(turns);
        streak_starts += conversation.streak_starts;
        score_sum += conversation.score_sum;
    }

    let turn_count = correct.len();
    let turn_accuracy = ratio(streak_starts, turn_count, "turn accuracy")?;

    Ok(CascadeScore {
        turn_accuracy,
        cascading_score: score_sum / turn_count as f64,
        conversation_count: conversations.len(),
        turn_count,
    })
}

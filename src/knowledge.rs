use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, EvalResult};

// intent_masks: intent name -> 0/1 over action classes.
// action_masks: action name -> 0/1 over value classes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub intents: Vec<String>,
    pub actions: Vec<String>,
    #[serde(default)]
    pub intent_masks: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    pub action_masks: BTreeMap<String, Vec<f64>>,
}

impl KnowledgeBase {
    pub fn intent_name(&self, index: usize) -> EvalResult<&str> {
        class_name(&self.intents, index, "intent")
    }

    pub fn action_name(&self, index: usize) -> EvalResult<&str> {
        class_name(&self.actions, index, "action")
    }

    pub fn action_mask_for_intent(&self, intent: &str) -> EvalResult<&[f64]> {
        self.intent_masks
            .get(intent)
            .map(Vec::as_slice)
            .ok_or_else(|| EvalError::MissingMask {
                kind: "intent",
                name: intent.to_string(),
            })
    }

    pub fn value_mask_for_action(&self, action: &str) -> EvalResult<&[f64]> {
        self.action_masks
            .get(action)
            .map(Vec::as_slice)
            .ok_or_else(|| EvalError::MissingMask {
                kind: "action",
                name: action.to_string(),
            })
    }

    pub fn action_masks_for(&self, intent_preds: &[usize]) -> EvalResult<Vec<&[f64]>> {
        intent_preds
            .iter()
            .map(|intent| self.action_mask_for_intent(self.intent_name(*intent)?))
            .collect()
    }

    pub fn value_masks_for(&self, action_preds: &[usize]) -> EvalResult<Vec<&[f64]>> {
        action_preds
            .iter()
            .map(|action| self.value_mask_for_action(self.action_name(*action)?))
            .collect()
    }

    pub fn validate(&self) -> EvalResult<()> {
        check_uniform_width(&self.intent_masks, "intent mask")?;
        check_uniform_width(&self.action_masks, "action mask")?;
        Ok(())
    }
}

fn class_name<'a>(names: &'a [String], index: usize, task: &str) -> EvalResult<&'a str> {
    names
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| EvalError::UnknownClass {
            task: task.to_string(),
            index: index as i64,
            known: names.len(),
        })
}

fn check_uniform_width(masks: &BTreeMap<String, Vec<f64>>, field: &str) -> EvalResult<()> {
    let mut widths = masks.iter();
    let Some((_, first)) = widths.next() else {
        return Ok(());
    };
    for (name, mask) in widths {
        if mask.len() != first.len() {
            return Err(EvalError::shape(
                format!("{field} {name}"),
                first.len(),
                mask.len(),
            ));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub enum KnowledgeBaseMode<'a> {
    #[default]
    Disabled,
    Constrained(&'a KnowledgeBase),
}

impl<'a> KnowledgeBaseMode<'a> {
    pub fn knowledge_base(self) -> Option<&'a KnowledgeBase> {
        match self {
            Self::Disabled => None,
            Self::Constrained(kb) => Some(kb),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Constrained(_) => "constrained",
        }
    }
}

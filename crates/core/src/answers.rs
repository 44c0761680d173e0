//! Per-question answers captured while configuring an item, with explicit
//! routing between the standard-question store and the product-specific one.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuestionId(pub String);

/// Normalized answer value. Routing never inspects the shape; the question
/// definition decides where an answer lands.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerValue {
    Text(String),
    Number(Decimal),
    Options(BTreeSet<String>),
}

pub type AnswerBag = BTreeMap<QuestionId, AnswerValue>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionScope {
    Standard,
    ProductSpecific,
}

impl QuestionScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::ProductSpecific => "product_specific",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "standard" => Some(Self::Standard),
            "product_specific" => Some(Self::ProductSpecific),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDef {
    pub id: QuestionId,
    pub label: String,
    pub scope: QuestionScope,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoutedAnswers {
    pub standard: Vec<(QuestionId, AnswerValue)>,
    pub product: Vec<(QuestionId, AnswerValue)>,
}

/// Splits a bag by each question's declared scope. Answers for questions the
/// catalog no longer knows are dropped rather than guessed at.
pub fn route_answers(bag: &AnswerBag, definitions: &[QuestionDef]) -> RoutedAnswers {
    let mut routed = RoutedAnswers::default();
    for (question_id, value) in bag {
        let Some(definition) = definitions.iter().find(|def| &def.id == question_id) else {
            warn!(question = %question_id.0, "discarding answer for unknown question");
            continue;
        };
        match definition.scope {
            QuestionScope::Standard => {
                routed.standard.push((question_id.clone(), value.clone()));
            }
            QuestionScope::ProductSpecific => {
                routed.product.push((question_id.clone(), value.clone()));
            }
        }
    }
    routed
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rust_decimal::Decimal;

    use super::{
        route_answers, AnswerBag, AnswerValue, QuestionDef, QuestionId, QuestionScope,
    };

    fn defs() -> Vec<QuestionDef> {
        vec![
            QuestionDef {
                id: QuestionId("best-call-time".to_owned()),
                label: "Best time to call".to_owned(),
                scope: QuestionScope::Standard,
            },
            QuestionDef {
                id: QuestionId("dosage".to_owned()),
                label: "Daily dosage".to_owned(),
                scope: QuestionScope::ProductSpecific,
            },
        ]
    }

    #[test]
    fn answers_follow_declared_scope_not_shape() {
        let mut bag = AnswerBag::new();
        // A numeric answer on a standard question must still land in the
        // standard store.
        bag.insert(
            QuestionId("best-call-time".to_owned()),
            AnswerValue::Number(Decimal::from(14)),
        );
        bag.insert(
            QuestionId("dosage".to_owned()),
            AnswerValue::Text("two capsules".to_owned()),
        );

        let routed = route_answers(&bag, &defs());
        assert_eq!(routed.standard.len(), 1);
        assert_eq!(routed.standard[0].0, QuestionId("best-call-time".to_owned()));
        assert_eq!(routed.product.len(), 1);
        assert_eq!(routed.product[0].0, QuestionId("dosage".to_owned()));
    }

    #[test]
    fn unknown_questions_are_dropped() {
        let mut bag = AnswerBag::new();
        bag.insert(
            QuestionId("retired-question".to_owned()),
            AnswerValue::Options(BTreeSet::from(["opt-1".to_owned()])),
        );

        let routed = route_answers(&bag, &defs());
        assert!(routed.standard.is_empty());
        assert!(routed.product.is_empty());
    }
}

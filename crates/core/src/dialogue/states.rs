use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialoguePhase {
    #[default]
    Init,
    Greeting,
    InformationGathering,
    Clarification,
    ProductSearch,
    ProductRecommendation,
    ProductDetail,
    FollowUp,
    End,
}

impl DialoguePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Greeting => "greeting",
            Self::InformationGathering => "information_gathering",
            Self::Clarification => "clarification",
            Self::ProductSearch => "product_search",
            Self::ProductRecommendation => "product_recommendation",
            Self::ProductDetail => "product_detail",
            Self::FollowUp => "follow_up",
            Self::End => "end",
        }
    }
}

impl std::fmt::Display for DialoguePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserIntent {
    Greeting,
    ProductInquiry,
    ClarificationResponse,
    ProductSelection,
    MoreDetails,
    Restart,
    End,
}

impl UserIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::ProductInquiry => "product_inquiry",
            Self::ClarificationResponse => "clarification_response",
            Self::ProductSelection => "product_selection",
            Self::MoreDetails => "more_details",
            Self::Restart => "restart",
            Self::End => "end",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: DialoguePhase,
    pub to: DialoguePhase,
    pub intent: UserIntent,
}

impl PhaseTransition {
    pub fn is_change(&self) -> bool {
        self.from != self.to
    }
}

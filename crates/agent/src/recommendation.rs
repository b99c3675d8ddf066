use pickwise_core::domain::product::ProductRecord;
use serde::Serialize;
use tracing::warn;

use crate::collaborators::Explainer;

pub const LISTING_HEADER: &str = "Here are the products we recommend for you:";
pub const LISTING_FOOTER: &str =
    "Recommendation completed! If you want to search again, please re-describe your requirements.";
pub const FALLBACK_REASON: &str =
    "This product meets your requirements and has good quality and design.";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub name: String,
    pub reason: String,
    /// `false` when the reason is the fixed fallback blurb.
    pub explained: bool,
}

/// Display name, followed by the description when the record has one.
pub fn product_summary(product: &ProductRecord) -> String {
    let name = product.display_name();
    match product.description() {
        Some(description) => format!("{name} - {description}"),
        None => name,
    }
}

/// Asks the explainer about each product in turn. A failed or empty
/// explanation falls back to [`FALLBACK_REASON`] for that product only.
pub async fn explain_products(
    explainer: &dyn Explainer,
    user_summary: &str,
    products: &[ProductRecord],
) -> Vec<Recommendation> {
    let mut recommendations = Vec::with_capacity(products.len());
    for (index, product) in products.iter().enumerate() {
        let name = product.display_name();
        let (reason, explained) =
            match explainer.explain(user_summary, &product_summary(product)).await {
                Ok(reason) if !reason.trim().is_empty() => (reason.trim().to_string(), true),
                Ok(_) => (FALLBACK_REASON.to_string(), false),
                Err(error) => {
                    warn!(
                        event_name = "recommendation.explanation_failed",
                        position = index + 1,
                        product = %name,
                        error = %error,
                        "explanation failed; using fallback reason"
                    );
                    (FALLBACK_REASON.to_string(), false)
                }
            };
        recommendations.push(Recommendation { name, reason, explained });
    }
    recommendations
}

pub fn render_listing(recommendations: &[Recommendation]) -> String {
    let mut output = format!("{LISTING_HEADER}\n\n");
    for (index, recommendation) in recommendations.iter().enumerate() {
        output.push_str(&format!(
            "{}. {}\n   Recommendation reason: {}\n\n",
            index + 1,
            recommendation.name,
            recommendation.reason
        ));
    }
    output.push_str(LISTING_FOOTER);
    output
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use pickwise_core::domain::product::ProductRecord;
    use pickwise_core::errors::CollaboratorError;
    use serde_json::json;

    use super::{explain_products, product_summary, render_listing, FALLBACK_REASON};
    use crate::collaborators::Explainer;

    struct PickyExplainer;

    #[async_trait]
    impl Explainer for PickyExplainer {
        async fn explain(
            &self,
            _user_summary: &str,
            product_summary: &str,
        ) -> Result<String, CollaboratorError> {
            if product_summary.starts_with("Broken") {
                Err(CollaboratorError::Transport {
                    collaborator: "llm".to_string(),
                    message: "connection reset".to_string(),
                })
            } else {
                Ok(format!("Fits because of {product_summary}."))
            }
        }
    }

    fn record(value: serde_json::Value) -> ProductRecord {
        ProductRecord::from_value(value).expect("object literal")
    }

    #[test]
    fn summary_appends_description_when_present() {
        assert_eq!(
            product_summary(&record(json!({"name": "Cup Pull", "description": "Antique brass"}))),
            "Cup Pull - Antique brass"
        );
        assert_eq!(product_summary(&record(json!({"title": "Edge Pull", "description": null}))), "Edge Pull");
    }

    #[tokio::test]
    async fn failed_explanations_fall_back_per_product() {
        let products = vec![record(json!({"name": "Cup Pull"})), record(json!({"name": "Broken Knob"}))];

        let recommendations = explain_products(&PickyExplainer, "category:pull", &products).await;

        assert_eq!(recommendations[0].reason, "Fits because of Cup Pull.");
        assert!(recommendations[0].explained);
        assert_eq!(recommendations[1].reason, FALLBACK_REASON);
        assert!(!recommendations[1].explained);
    }

    #[tokio::test]
    async fn listing_numbers_each_product() {
        let products = vec![record(json!({"name": "Cup Pull"})), record(json!({"name": "Bar Pull"}))];
        let listing =
            render_listing(&explain_products(&PickyExplainer, "category:pull", &products).await);

        assert!(listing.starts_with("Here are the products we recommend for you:\n\n1. Cup Pull\n"));
        assert!(listing.contains("2. Bar Pull\n   Recommendation reason: Fits because of Bar Pull.\n"));
        assert!(listing.ends_with("please re-describe your requirements."));
    }
}

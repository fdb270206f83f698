//! crates/roleplay_training_core/src/catalog.rs
//!
//! Built-in customer personas and per-role scenario templates.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::{Persona, PersonaDifficulty, Scenario, ScenarioDifficulty, StaffRole};

/// Scenarios generated per call to [`generate_scenarios`].
pub const GENERATION_BATCH: usize = 3;

/// A reusable blueprint for a [`Scenario`]. Unset fields are sampled on instantiation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenarioTemplate {
    pub role: StaffRole,
    pub name: &'static str,
    pub description: &'static str,
    pub situation: &'static str,
    pub criteria: &'static [&'static str],
    pub customer_type: Option<&'static str>,
    pub difficulty: Option<ScenarioDifficulty>,
    pub duration_mins: u32,
}

struct PersonaDef {
    id: &'static str,
    name: &'static str,
    personality: &'static str,
    traits: &'static [&'static str],
    difficulty: PersonaDifficulty,
    description: &'static str,
}

const PERSONAS: &[PersonaDef] = &[
    PersonaDef {
        id: "angry",
        name: "Frustrated Sarah",
        personality: "Angry Customer",
        traits: &["Impatient", "Demanding", "Skeptical"],
        difficulty: PersonaDifficulty::Hard,
        description: "Customer with a bad experience who needs careful handling",
    },
    PersonaDef {
        id: "confused",
        name: "Confused Mike",
        personality: "Confused Customer",
        traits: &["Uncertain", "Needs guidance", "Asks many questions"],
        difficulty: PersonaDifficulty::Medium,
        description: "Customer who needs clear explanations and step-by-step help",
    },
    PersonaDef {
        id: "price-sensitive",
        name: "Budget-conscious Emma",
        personality: "Price-Sensitive Customer",
        traits: &["Cost-conscious", "Needs value", "Compares options"],
        difficulty: PersonaDifficulty::Medium,
        description: "Customer focused on getting the best value for money",
    },
    PersonaDef {
        id: "tech-savvy",
        name: "Tech-savvy Alex",
        personality: "Tech-Savvy Customer",
        traits: &["Detail-oriented", "Knowledgeable", "Wants specifics"],
        difficulty: PersonaDifficulty::Easy,
        description: "Customer with technical knowledge who asks detailed questions",
    },
    PersonaDef {
        id: "enthusiastic",
        name: "Enthusiastic Lisa",
        personality: "Enthusiastic Customer",
        traits: &["Excited", "Eager to learn", "Open to suggestions"],
        difficulty: PersonaDifficulty::Easy,
        description: "Customer who is excited about skincare and eager to try new products",
    },
];

const fn template(
    role: StaffRole,
    name: &'static str,
    description: &'static str,
    situation: &'static str,
    criteria: &'static [&'static str],
) -> ScenarioTemplate {
    ScenarioTemplate {
        role,
        name,
        description,
        situation,
        criteria,
        customer_type: None,
        difficulty: None,
        duration_mins: 15,
    }
}

const fn preset(
    role: StaffRole,
    name: &'static str,
    description: &'static str,
    situation: &'static str,
    criteria: &'static [&'static str],
    customer_type: &'static str,
    difficulty: ScenarioDifficulty,
    duration_mins: u32,
) -> ScenarioTemplate {
    ScenarioTemplate {
        role,
        name,
        description,
        situation,
        criteria,
        customer_type: Some(customer_type),
        difficulty: Some(difficulty),
        duration_mins,
    }
}

use ScenarioDifficulty::{Advanced, Beginner, Intermediate};
use StaffRole::{Coach, CustomerService, Sales, Scientist};

const COACH_TEMPLATES: &[ScenarioTemplate] = &[
    template(Coach, "Product Recommendation", "Help customer choose the right product", "Customer is overwhelmed by choices and needs guidance", &["Understood customer needs", "Recommended appropriate products", "Built customer confidence"]),
    template(Coach, "Ingredient Education", "Explain product ingredients and benefits", "Customer wants to understand what's in the product and why", &["Explained key ingredients clearly", "Connected benefits to customer needs", "Addressed safety concerns"]),
    template(Coach, "Routine Building", "Create a personalized product routine", "Customer wants help building a complete routine", &["Assessed customer needs", "Created tailored routine", "Explained usage order"]),
    template(Coach, "First-Time User Guidance", "Onboard a brand new customer", "Customer has never used these products before", &["Made customer comfortable", "Explained basics clearly", "Set realistic expectations"]),
    template(Coach, "Skin Concern Analysis", "Help identify and address skin concerns", "Customer has specific skin issues they want help with", &["Asked diagnostic questions", "Identified root causes", "Recommended solutions"]),
    template(Coach, "Product Comparison", "Compare different product options", "Customer wants to know differences between similar products", &["Highlighted key differences", "Matched to customer needs", "Helped make decision"]),
];

const SALES_TEMPLATES: &[ScenarioTemplate] = &[
    template(Sales, "Cross-Sell Opportunity", "Identify and sell complementary products", "Customer is purchasing one item - opportunity to suggest related products", &["Identified needs", "Suggested relevant products", "Increased basket size"]),
    template(Sales, "Limited Time Offer", "Create urgency with promotions", "Customer is browsing but hasn't committed to purchase", &["Highlighted promotion value", "Created urgency", "Closed the sale"]),
    template(Sales, "Objection Handling", "Overcome customer hesitation", "Customer has concerns preventing purchase", &["Identified objection", "Addressed concerns effectively", "Moved toward close"]),
    template(Sales, "Value Demonstration", "Show ROI and long-term value", "Customer questions if investment is worth it", &["Calculated value", "Showed long-term benefits", "Justified price"]),
    template(Sales, "Competitor Comparison", "Position against competitor products", "Customer is comparing us to competitors", &["Highlighted differentiators", "Addressed competitor weaknesses", "Won the comparison"]),
    template(Sales, "Subscription Upsell", "Convert one-time buyer to subscriber", "Customer making one-time purchase but could benefit from subscription", &["Explained subscription benefits", "Overcame commitment concerns", "Secured recurring revenue"]),
];

const CUSTOMER_SERVICE_TEMPLATES: &[ScenarioTemplate] = &[
    template(CustomerService, "Wrong Item Received", "Handle wrong product delivery complaint", "Customer received wrong item and is frustrated", &["Apologized sincerely", "Arranged replacement", "Compensated appropriately"]),
    template(CustomerService, "Product Not Working", "Troubleshoot product effectiveness issue", "Customer says product isn't working as expected", &["Asked diagnostic questions", "Identified issue", "Provided solution"]),
    template(CustomerService, "Cancellation Request", "Handle subscription cancellation professionally", "Customer wants to cancel their subscription", &["Understood reason", "Offered alternatives", "Retained or gracefully released"]),
    template(CustomerService, "Delayed Shipment", "Manage delivery delay complaints", "Order is late and customer is upset", &["Acknowledged frustration", "Investigated status", "Provided update and solution"]),
    template(CustomerService, "Damaged Product", "Handle damaged delivery complaint", "Product arrived broken or damaged", &["Showed empathy", "Expedited replacement", "Prevented future issues"]),
    template(CustomerService, "Refund Processing", "Handle refund request smoothly", "Customer wants money back", &["Processed quickly", "Explained timeline", "Maintained relationship"]),
];

const SCIENTIST_TEMPLATES: &[ScenarioTemplate] = &[
    template(Scientist, "Clinical Study Questions", "Explain research backing products", "Customer wants scientific evidence of effectiveness", &["Cited relevant studies", "Explained methodology", "Answered scientifically"]),
    template(Scientist, "Ingredient Interaction", "Address ingredient compatibility concerns", "Customer worried about mixing ingredients", &["Explained interactions", "Provided safety guidance", "Recommended usage"]),
    template(Scientist, "Allergen Inquiry", "Provide detailed allergen information", "Customer has allergies and needs detailed ingredient info", &["Listed potential allergens", "Suggested alternatives", "Ensured safety"]),
    template(Scientist, "Formulation Science", "Explain how product formulations work", "Customer wants to understand the science behind formulation", &["Explained chemistry", "Made it accessible", "Built credibility"]),
    template(Scientist, "Efficacy Timeline", "Set scientific expectations for results", "Customer wants to know when they'll see results", &["Explained biological timeline", "Referenced research", "Set realistic expectations"]),
    template(Scientist, "Pregnancy Safety", "Address safety during pregnancy", "Pregnant customer needs safety information", &["Provided safety data", "Recommended safe alternatives", "Consulted guidelines"]),
];

// Seeded into an empty store so a fresh install has something to run.
const COACH_DEFAULTS: &[ScenarioTemplate] = &[
    preset(Coach, "First-Time Customer Guidance", "Help a new customer understand product benefits and usage", "A new customer is confused about which product to choose and how to use it", &["Explained product benefits clearly", "Provided usage instructions", "Made customer feel confident"], "confused", Beginner, 15),
    preset(Coach, "Skeptical Customer Education", "Address concerns and build trust with a skeptical customer", "Customer is unsure if products will work for their specific needs", &["Addressed specific concerns", "Provided evidence/testimonials", "Built credibility"], "tech-savvy", Intermediate, 20),
    preset(Coach, "Advanced Product Consultation", "Guide an experienced customer to optimize their routine", "An informed customer wants to improve their current routine with advanced tips", &["Provided expert-level insights", "Customized recommendations", "Deepened customer knowledge"], "tech-savvy", Advanced, 25),
];

const SALES_DEFAULTS: &[ScenarioTemplate] = &[
    preset(Sales, "Upsell to Premium Products", "Convince customer to upgrade to premium product line", "Customer is interested in basic products but could benefit from premium options", &["Highlighted premium benefits", "Addressed price concerns", "Created desire for upgrade"], "price-sensitive", Intermediate, 15),
    preset(Sales, "Handle Price Objection", "Overcome price resistance and demonstrate value", "Customer loves the product but says it's too expensive", &["Justified pricing with value", "Offered payment options", "Closed the sale"], "price-sensitive", Advanced, 20),
    preset(Sales, "Bundle Sale Opportunity", "Create a compelling bundle offer for maximum value", "Customer is buying one product - opportunity to create a complete routine bundle", &["Identified complementary products", "Created compelling bundle", "Increased order value"], "enthusiastic", Intermediate, 15),
];

const CUSTOMER_SERVICE_DEFAULTS: &[ScenarioTemplate] = &[
    preset(CustomerService, "Product Issue Resolution", "Resolve a complaint about product not meeting expectations", "Customer is unhappy because product didn't deliver expected results", &["Showed empathy", "Identified root cause", "Provided solution", "Restored satisfaction"], "angry", Intermediate, 20),
    preset(CustomerService, "Shipping Delay Management", "Calm an upset customer about delayed order", "Customer's order is delayed and they're very frustrated", &["Apologized sincerely", "Explained situation", "Offered compensation", "Retained customer"], "angry", Advanced, 15),
    preset(CustomerService, "Return and Refund Request", "Process return while attempting to retain customer", "Customer wants to return product and get refund", &["Understood reason for return", "Offered alternatives", "Processed smoothly"], "price-sensitive", Intermediate, 15),
];

const SCIENTIST_DEFAULTS: &[ScenarioTemplate] = &[
    preset(Scientist, "Explain Scientific Benefits", "Provide evidence-based explanation of product ingredients", "Customer wants to know the science behind how products work", &["Explained mechanisms scientifically", "Cited research", "Made it understandable"], "tech-savvy", Advanced, 25),
    preset(Scientist, "Address Safety Concerns", "Provide scientific reassurance about product safety", "Customer is concerned about ingredients and potential side effects", &["Addressed safety scientifically", "Explained testing/certifications", "Built confidence"], "confused", Intermediate, 20),
    preset(Scientist, "Compare to Competitors", "Use scientific evidence to differentiate from competitors", "Customer is comparing your product to competitor products", &["Highlighted unique formulation", "Provided comparative data", "Established superiority"], "tech-savvy", Advanced, 20),
];

//=========================================================================================
// Public Catalog API
//=========================================================================================

pub fn list_personas() -> Vec<Persona> {
    PERSONAS.iter().map(to_persona).collect()
}

pub fn persona(id: &str) -> Option<Persona> {
    PERSONAS.iter().find(|p| p.id == id).map(to_persona)
}

pub fn persona_ids() -> impl Iterator<Item = &'static str> {
    PERSONAS.iter().map(|p| p.id)
}

pub fn templates_for(role: StaffRole) -> &'static [ScenarioTemplate] {
    match role {
        StaffRole::Coach => COACH_TEMPLATES,
        StaffRole::Sales => SALES_TEMPLATES,
        StaffRole::CustomerService => CUSTOMER_SERVICE_TEMPLATES,
        StaffRole::Scientist => SCIENTIST_TEMPLATES,
    }
}

/// The pre-populated scenarios for `role`, each with a fresh id.
pub fn default_scenarios(role: StaffRole) -> Vec<Scenario> {
    let presets = match role {
        StaffRole::Coach => COACH_DEFAULTS,
        StaffRole::Sales => SALES_DEFAULTS,
        StaffRole::CustomerService => CUSTOMER_SERVICE_DEFAULTS,
        StaffRole::Scientist => SCIENTIST_DEFAULTS,
    };
    presets.iter().map(instantiate).collect()
}

pub fn instantiate(template: &ScenarioTemplate) -> Scenario {
    instantiate_with(template, &mut rand::thread_rng())
}

/// Builds a scenario with a fresh id, sampling any unset customer type or difficulty.
pub fn instantiate_with<R: Rng + ?Sized>(template: &ScenarioTemplate, rng: &mut R) -> Scenario {
    let customer_type = template
        .customer_type
        .or_else(|| PERSONAS.choose(rng).map(|p| p.id))
        .unwrap_or("confused");
    let difficulty = template
        .difficulty
        .or_else(|| ScenarioDifficulty::ALL.choose(rng).copied())
        .unwrap_or(ScenarioDifficulty::Intermediate);

    Scenario {
        id: Uuid::new_v4(),
        role: template.role,
        name: template.name.to_string(),
        description: template.description.to_string(),
        situation: template.situation.to_string(),
        customer_type: customer_type.to_string(),
        success_criteria: template.criteria.iter().map(|c| c.to_string()).collect(),
        duration_mins: template.duration_mins,
        difficulty,
    }
}

/// True when every template name for `role` already appears in `existing_names`.
///
/// Matching is by name, so a scenario renamed to a template's name marks that
/// template as used.
pub fn all_templates_used<S: AsRef<str>>(role: StaffRole, existing_names: &[S]) -> bool {
    unused_templates(role, existing_names).next().is_none()
}

/// Instantiates up to [`GENERATION_BATCH`] templates not yet present by name.
pub fn generate_scenarios<S: AsRef<str>>(role: StaffRole, existing_names: &[S]) -> Vec<Scenario> {
    unused_templates(role, existing_names)
        .take(GENERATION_BATCH)
        .enumerate()
        .map(|(i, template)| {
            let mut scenario = instantiate(template);
            scenario.duration_mins = 15 + (i as u32) * 5;
            scenario
        })
        .collect()
}

fn unused_templates<'a, S: AsRef<str>>(
    role: StaffRole,
    existing_names: &'a [S],
) -> impl Iterator<Item = &'static ScenarioTemplate> + 'a {
    let existing: HashSet<&str> = existing_names.iter().map(AsRef::as_ref).collect();
    templates_for(role)
        .iter()
        .filter(move |t| !existing.contains(t.name))
}

fn to_persona(def: &PersonaDef) -> Persona {
    Persona {
        id: def.id.to_string(),
        name: def.name.to_string(),
        personality: def.personality.to_string(),
        traits: def.traits.iter().map(|t| t.to_string()).collect(),
        difficulty: def.difficulty,
        description: def.description.to_string(),
    }
}

/// Emoji shown next to customer messages for a persona.
pub fn persona_emotion(customer_type: &str) -> &'static str {
    match customer_type {
        "angry" => "😠",
        "confused" => "😕",
        "price-sensitive" => "💰",
        "tech-savvy" => "🤓",
        "enthusiastic" => "😍",
        _ => "😊",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(role: StaffRole) -> Vec<String> {
        templates_for(role).iter().map(|t| t.name.to_string()).collect()
    }

    #[test]
    fn every_role_has_six_templates() {
        for role in StaffRole::ALL {
            assert_eq!(templates_for(role).len(), 6, "{role}");
            assert!(templates_for(role).iter().all(|t| t.role == role));
        }
    }

    #[test]
    fn all_templates_used_is_a_name_set_difference() {
        let mut existing = names(StaffRole::Coach);
        assert!(all_templates_used(StaffRole::Coach, &existing));

        existing.remove(2);
        assert!(!all_templates_used(StaffRole::Coach, &existing));

        // A scenario renamed to the missing template name counts as using it.
        existing.push("Routine Building".to_string());
        assert!(all_templates_used(StaffRole::Coach, &existing));
    }

    #[test]
    fn instantiate_gives_fresh_ids_and_identical_content() {
        let template = &templates_for(StaffRole::Sales)[0];
        let snapshot = *template;
        let a = instantiate(template);
        let mut b = instantiate(template);
        assert_ne!(a.id, b.id);
        assert_eq!(*template, snapshot);

        // Sampled fields may differ between calls; the template content must not.
        assert_eq!(a.name, b.name);
        assert_eq!(a.description, b.description);
        assert_eq!(a.situation, b.situation);
        assert_eq!(a.success_criteria, b.success_criteria);
        b.id = a.id;
        b.customer_type = a.customer_type.clone();
        b.difficulty = a.difficulty;
        assert_eq!(a, b);
    }

    #[test]
    fn instantiate_samples_a_known_persona_when_unset() {
        let template = &templates_for(StaffRole::Scientist)[3];
        for _ in 0..20 {
            let scenario = instantiate(template);
            assert!(persona(&scenario.customer_type).is_some());
        }
    }

    #[test]
    fn presets_keep_their_customer_type_and_difficulty() {
        let scenarios = default_scenarios(StaffRole::CustomerService);
        assert_eq!(scenarios.len(), 3);
        assert_eq!(scenarios[0].customer_type, "angry");
        assert_eq!(scenarios[1].difficulty, ScenarioDifficulty::Advanced);
        assert!(scenarios.iter().all(|s| persona(&s.customer_type).is_some()));
    }

    #[test]
    fn generate_scenarios_takes_three_unused_then_the_rest() {
        let first = generate_scenarios::<String>(StaffRole::Coach, &[]);
        assert_eq!(first.len(), 3);
        assert_eq!(
            first.iter().map(|s| s.duration_mins).collect::<Vec<_>>(),
            vec![15, 20, 25]
        );

        let mut existing: Vec<String> = first.iter().map(|s| s.name.clone()).collect();
        let second = generate_scenarios(StaffRole::Coach, &existing);
        assert_eq!(second.len(), 3);
        assert!(second.iter().all(|s| !existing.contains(&s.name)));

        existing.extend(second.into_iter().map(|s| s.name));
        assert!(generate_scenarios(StaffRole::Coach, &existing).is_empty());
    }

    #[test]
    fn personas_are_listed_in_catalog_order() {
        let ids: Vec<String> = list_personas().into_iter().map(|p| p.id).collect();
        assert_eq!(
            ids,
            vec!["angry", "confused", "price-sensitive", "tech-savvy", "enthusiastic"]
        );
        assert_eq!(persona_emotion("angry"), "😠");
        assert_eq!(persona_emotion("random"), "😊");
    }
}

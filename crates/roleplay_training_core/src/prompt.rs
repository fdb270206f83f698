//! crates/roleplay_training_core/src/prompt.rs
//!
//! Prompt assembly for both roleplay speakers and for feedback revisions.

use std::fmt::Write as _;

use crate::catalog;
use crate::domain::{Guideline, KnowledgeEntry, Message, Persona, Scenario, Sender, StaffRole};
use crate::memory::TrainingMemory;
use uuid::Uuid;

/// Messages of recent history the customer persona gets to see.
pub const CUSTOMER_HISTORY_WINDOW: usize = 4;

/// Messages of recent history sent with a revision request.
pub const REVISION_HISTORY_WINDOW: usize = 6;

const ANTI_HALLUCINATION_RULES: &str = r#"🚨 CRITICAL ANTI-HALLUCINATION RULES - MUST FOLLOW:
1. ONLY use information EXPLICITLY provided in the knowledge base below
2. NEVER invent or make up ANY product names, model numbers, prices, ingredients, or specific details
3. If you don't know something from the knowledge base, say "I don't have that specific information" or "Let me check with my team"
4. DO NOT mention specific products unless they are EXPLICITLY named in the knowledge base
5. DO NOT make up technical specifications, measurements, percentages, or numbers
6. DO NOT invent product features or benefits not stated in the knowledge base
7. Speak in GENERAL terms about benefits and solutions if specific details aren't in the knowledge base"#;

const CONVERSATION_MANAGEMENT: &str = r#"CONVERSATION MANAGEMENT:
- READ THE ENTIRE CONVERSATION HISTORY to understand the context and emotional state
- PAY ATTENTION to how the customer's emotions are evolving (frustration, escalation, etc.)
- ADAPT your response based on the conversation flow - DO NOT repeat previous responses
- If the customer is getting more frustrated, acknowledge their escalating concerns and adjust your approach
- Focus on achieving the scenario success criteria listed above
- Adapt your approach to the customer's personality ({customer_type})
- Be helpful, professional, and solution-oriented
- NEVER give the same or similar response twice - each response must progress the conversation

RESPONSE GUIDELINES:
- Use ONLY information from the knowledge base below
- If asked about specific products not in the knowledge base, offer to connect them with a specialist or check availability
- Focus on understanding customer needs and providing helpful guidance within your knowledge
- Be honest about limitations - it's better to admit you don't know than to make up information"#;

const CORRECTIONS_FOOTER: &str = r#"⚠️ MANDATORY: You will be RE-EVALUATED on whether you fixed these issues. If you repeat the same mistakes, you FAIL.
⚠️ READ each correction above carefully and APPLY IT to your response.
⚠️ If feedback says you're hallucinating, STOP making things up and use ONLY the knowledge base.

These corrections OVERRIDE everything else. Fix them NOW!"#;

const REVISION_INSTRUCTIONS: &str = r#"REVISION INSTRUCTIONS:
1. Read the trainer's feedback carefully
2. Identify what was wrong or missing in your previous response
3. Write a COMPLETELY NEW response that:
   - Directly addresses the trainer's feedback
{length_rule}   - Fixes the specific issues mentioned
   - Maintains your professional, warm tone
   - Provides better, more helpful guidance to the customer
4. DO NOT just repeat your previous response
5. DO NOT ignore the trainer's feedback
6. SHOW that you learned from the feedback by making substantial improvements

Now provide your REVISED response to the customer's question above:"#;

const CUSTOMER_INSTRUCTIONS: &str = r#"INSTRUCTIONS FOR YOUR RESPONSE:
- YOU ARE THE CUSTOMER, NOT THE REPRESENTATIVE
- DO NOT greet anyone or say "Welcome to..." - you are the one being helped
- DO NOT use templates like "{{customer_name}}" or "{{business_name}}"
- Respond naturally as a {customer_type} customer would
- React to what the staff member just said in a realistic way
- Progress the conversation naturally (don't repeat the same concerns)
- Show character development - gradually move toward resolution if the staff member is doing well
- Ask follow-up questions that challenge the staff member to meet the scenario objectives
- Keep responses conversational and realistic (1-3 sentences)
- Don't be too easy to convince, but don't be impossibly difficult either
- Use natural customer language, not marketing speak

IMPORTANT: You are a CUSTOMER seeking help, NOT a business representative greeting customers."#;

//=========================================================================================
// Staff Prompts
//=========================================================================================

/// Inputs shared by every staff-side prompt.
#[derive(Debug, Clone, Copy)]
pub struct StaffPromptContext<'a> {
    pub staff_name: &'a str,
    pub staff_role: StaffRole,
    pub scenario: &'a Scenario,
    /// The staff member's whole training memory.
    pub memory: &'a TrainingMemory,
    /// Lessons that apply to this scenario, rendered as explicit corrections.
    pub corrections: &'a [String],
    pub knowledge_base: &'a [KnowledgeEntry],
    pub guidelines: &'a [Guideline],
    pub history: &'a [Message],
}

/// The staff reply being revised and the trainer's feedback on it.
#[derive(Debug, Clone, Copy)]
pub struct Revision<'a> {
    pub customer_question: &'a str,
    pub previous_response: &'a str,
    pub feedback: &'a str,
}

/// Builds the instruction prompt for a regular staff reply.
pub fn staff_prompt(ctx: &StaffPromptContext<'_>) -> String {
    let scenario = ctx.scenario;
    let mut out = format!(
        "You are {}, a {} representative helping a customer.\n",
        ctx.staff_name, ctx.staff_role
    );

    let _ = write!(
        out,
        "\nTRAINING SCENARIO: {}\nDESCRIPTION: {}\nCUSTOMER TYPE: {}\n\nSUCCESS CRITERIA TO ACHIEVE:\n{}\n",
        scenario.name,
        scenario.situation,
        scenario.customer_type,
        criteria_list(&scenario.success_criteria)
    );

    if !ctx.corrections.is_empty() {
        out.push_str("\n🚨🚨🚨 CRITICAL TRAINING FEEDBACK - YOU MADE THESE MISTAKES BEFORE - DO NOT REPEAT THEM! 🚨🚨🚨\n\n");
        out.push_str("The trainer has provided the following corrections to your PREVIOUS RESPONSES. You MUST fix these issues NOW:\n\n");
        for (i, lesson) in ctx.corrections.iter().enumerate() {
            let _ = writeln!(out, "{}. CORRECTION REQUIRED: {}", i + 1, lesson);
        }
        out.push('\n');
        out.push_str(CORRECTIONS_FOOTER);
        out.push('\n');
    }

    out.push('\n');
    out.push_str(ANTI_HALLUCINATION_RULES);
    out.push_str("\n\n");
    out.push_str(&CONVERSATION_MANAGEMENT.replace("{customer_type}", &scenario.customer_type));

    out.push_str(&knowledge_context(ctx.knowledge_base));
    out.push_str(&guidelines_context(ctx.guidelines));
    out.push_str(&memory_context(ctx.memory, ctx.staff_name, ctx.staff_role));

    let history = format_history(ctx.history);
    if !history.is_empty() {
        let _ = write!(out, "\n\nRECENT CONVERSATION:\n{}\n", history);
    }

    out.push_str("\nRespond to the customer's CURRENT message while considering the FULL conversation history and emotional trajectory.");
    out
}

/// Builds the instruction prompt asking staff to rewrite a reply after feedback.
pub fn revision_prompt(ctx: &StaffPromptContext<'_>, revision: &Revision<'_>) -> String {
    let shorter = wants_shorter(revision.feedback);
    let longer = wants_longer(revision.feedback);

    let mut out = format!(
        "You are {} receiving training feedback. You must REVISE your previous response based on the trainer's specific feedback.\n\n\
         TRAINING CONTEXT:\nScenario: {}\nCustomer Type: {}\n\n\
         CUSTOMER'S QUESTION:\n\"{}\"\n\n\
         YOUR PREVIOUS RESPONSE (THAT NEEDS REVISION):\n\"{}\"\n\n\
         🚨 TRAINER'S FEEDBACK ON YOUR RESPONSE:\n\"{}\"",
        ctx.staff_name,
        ctx.scenario.name,
        ctx.scenario.customer_type,
        revision.customer_question,
        revision.previous_response,
        revision.feedback
    );

    if shorter {
        let _ = write!(
            out,
            "\n\n⚠️ CRITICAL: The trainer wants a SHORTER response! Your previous response was {} words.\n\
             Make your revised response SIGNIFICANTLY shorter (aim for 30-50 words MAX). Be concise and direct!",
            revision.previous_response.split_whitespace().count()
        );
    }
    if longer {
        out.push_str(
            "\n\n⚠️ CRITICAL: The trainer wants MORE DETAIL! Your previous response was too brief.\n\
             Expand your revised response with more explanation, examples, and helpful details.",
        );
    }

    if !ctx.corrections.is_empty() {
        out.push_str("\n\nEARLIER CORRECTIONS THAT STILL APPLY:\n");
        for (i, lesson) in ctx.corrections.iter().enumerate() {
            let _ = writeln!(out, "{}. CORRECTION REQUIRED: {}", i + 1, lesson);
        }
    }

    let mut length_rule = String::new();
    if shorter {
        length_rule.push_str("   - Is MUCH SHORTER than your previous response (cut it by at least 50%)\n");
    }
    if longer {
        length_rule.push_str("   - Is MORE DETAILED than your previous response (at least 2x longer)\n");
    }
    out.push_str("\n\n");
    out.push_str(&REVISION_INSTRUCTIONS.replace("{length_rule}", &length_rule));

    out.push_str(&knowledge_context(ctx.knowledge_base));
    out.push_str(&guidelines_context(ctx.guidelines));
    out.push_str(&memory_context(ctx.memory, ctx.staff_name, ctx.staff_role));
    out
}

/// The trainer asked for a more concise answer.
pub fn wants_shorter(feedback: &str) -> bool {
    let lower = feedback.to_lowercase();
    ["less word", "shorter", "brief", "concise"]
        .iter()
        .any(|cue| lower.contains(cue))
}

/// The trainer asked for a more detailed answer.
pub fn wants_longer(feedback: &str) -> bool {
    let lower = feedback.to_lowercase();
    ["more detail", "longer", "elaborate"]
        .iter()
        .any(|cue| lower.contains(cue))
}

//=========================================================================================
// Customer Prompts
//=========================================================================================

/// Personality instructions for a customer persona id.
pub fn customer_personality(customer_type: &str) -> &'static str {
    match customer_type {
        "angry" => "You are a VERY FRUSTRATED customer who had a bad experience. You're demanding, skeptical, and need to be convinced through concrete actions (refunds, guarantees, expert consultation). You gradually become less hostile if the staff member shows genuine effort to fix the problem.",
        "price-sensitive" => "You are a BUDGET-CONSCIOUS customer looking for affordable solutions that actually work. You question costs, ask about value, and need proof that expensive products/services are worth it. You're interested but need to see clear financial value.",
        "tech-savvy" => "You are a RESEARCH-ORIENTED customer who wants scientific proof. You ask technical questions about details, data, and research. You respect expertise and detailed explanations.",
        "enthusiastic" => "You are an EXCITED customer who loves trying new innovations. You're eager to try advanced products/services and want the most comprehensive solutions. You're ready to invest in premium options.",
        _ => "You are a CONFUSED customer who feels overwhelmed. You ask lots of clarifying questions, need simple explanations, and worry about making mistakes. You become more confident as the staff member provides clear, step-by-step guidance.",
    }
}

/// Builds the prompt for the customer's reaction to the latest staff message.
pub fn customer_prompt(scenario: &Scenario, staff_message: &str, history: &[Message], turn: u32) -> String {
    let start = history.len().saturating_sub(CUSTOMER_HISTORY_WINDOW);
    format!(
        "{personality}\n\nCURRENT SCENARIO: {name}\nSCENARIO CONTEXT: {situation}\n\n\
         CONVERSATION PROGRESS: This is turn {turn} of the conversation.\n\n\
         RECENT CONVERSATION:\n{history}\n\n\
         STAFF MEMBER'S LATEST RESPONSE: \"{staff_message}\"\n\n\
         {instructions}\n\n\
         As a {customer_type} customer, how do you respond to the staff member's message: \"{staff_message}\"",
        personality = customer_personality(&scenario.customer_type),
        name = scenario.name,
        situation = scenario.situation,
        turn = turn,
        history = format_history(&history[start..]),
        staff_message = staff_message,
        instructions = CUSTOMER_INSTRUCTIONS.replace("{customer_type}", &scenario.customer_type),
        customer_type = scenario.customer_type,
    )
}

/// Builds the prompt asking the customer persona to open the conversation.
pub fn opening_prompt(scenario: &Scenario, persona: Option<&Persona>) -> String {
    let personality = persona.map(|p| p.personality.as_str()).unwrap_or("Customer");
    let traits = persona
        .map(|p| p.traits.join(", "))
        .unwrap_or_else(|| "General customer".to_string());
    format!(
        "Generate a realistic initial customer message for this scenario:\n\n\
         Scenario: {}\nDescription: {}\nCustomer Personality: {}\nCustomer Traits: {}\n\n\
         The customer should naturally bring up their issue or question based on the scenario description. \
         Keep it conversational and realistic (1-3 sentences). Act as if you ARE the customer starting the conversation.",
        scenario.name, scenario.situation, personality, traits
    )
}

//=========================================================================================
// Shared Sections
//=========================================================================================

/// Renders history as `Staff: ...` / `Customer: ...` lines. Error entries are skipped.
pub fn format_history(history: &[Message]) -> String {
    history
        .iter()
        .filter(|m| !m.is_error())
        .map(|m| {
            let speaker = match m.sender {
                Sender::Staff => "Staff",
                Sender::Customer => "Customer",
            };
            format!("{}: {}", speaker, m.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn criteria_list(criteria: &[String]) -> String {
    if criteria.is_empty() {
        return "- Complete the training scenario successfully".to_string();
    }
    criteria
        .iter()
        .map(|c| format!("- {}", c))
        .collect::<Vec<_>>()
        .join("\n")
}

fn knowledge_context(knowledge_base: &[KnowledgeEntry]) -> String {
    if knowledge_base.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n\n📚 KNOWLEDGE BASE - CRITICAL: ONLY USE INFORMATION FROM THIS LIST:\n");
    for entry in knowledge_base {
        out.push_str("- ");
        if !entry.category.is_empty() {
            let _ = write!(out, "[{}] ", entry.category);
        }
        if let Some(topic) = entry.topic.as_deref().filter(|t| !t.is_empty()) {
            let _ = write!(out, "{}: ", topic);
        }
        out.push_str(&entry.content);
        out.push('\n');
    }
    out.push_str("\n⚠️ DO NOT mention any products, prices, or information that are NOT listed above.");
    out
}

fn guidelines_context(guidelines: &[Guideline]) -> String {
    let relevant: Vec<&Guideline> = guidelines.iter().filter(|g| g.applies_to_roleplay()).collect();
    if relevant.is_empty() {
        return String::new();
    }
    let body = relevant
        .iter()
        .map(|g| format!("**{}**\n{}", g.title, g.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("\n\n📋 TRAINING GUIDELINES - FOLLOW THESE RULES:\n{}", body)
}

fn memory_context(memory: &TrainingMemory, staff_name: &str, staff_role: StaffRole) -> String {
    if memory.is_empty() {
        return String::new();
    }
    let sections = memory
        .iter()
        .filter(|(_, lessons)| !lessons.is_empty())
        .map(|(key, lessons)| {
            let lines = lessons
                .iter()
                .map(|l| format!("  • {}", l))
                .collect::<Vec<_>>()
                .join("\n");
            format!("Scenario: {}\nLessons:\n{}", key, lines)
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "\n\n📝 TRAINING MEMORY - IMPORTANT LESSONS LEARNED:\nYou are {} ({}). Apply these lessons from your training:\n\n{}",
        staff_name, staff_role, sections
    )
}

/// Knowledge entries relevant to `message`, or all of them when nothing matches.
pub fn select_knowledge<'a>(knowledge_base: &'a [KnowledgeEntry], message: &str) -> Vec<&'a KnowledgeEntry> {
    let lower = message.to_lowercase();
    let words: Vec<&str> = lower
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation()))
        .filter(|w| w.len() > 2)
        .collect();

    let relevant: Vec<&KnowledgeEntry> = knowledge_base
        .iter()
        .filter(|entry| !entry.content.is_empty())
        .filter(|entry| {
            let content = entry.content.to_lowercase();
            let category = entry.category.to_lowercase();
            let topic = entry.topic.as_deref().unwrap_or_default().to_lowercase();
            words
                .iter()
                .any(|w| topic.contains(w) || category.contains(w) || content.contains(w))
                || entry
                    .keywords
                    .iter()
                    .map(|k| k.trim())
                    .filter(|k| !k.is_empty())
                    .any(|k| lower.contains(&k.to_lowercase()))
        })
        .collect();

    if relevant.is_empty() {
        knowledge_base.iter().collect()
    } else {
        relevant
    }
}

/// Turns trainer feedback into a roleplay guideline for later staff prompts.
/// A blank title becomes `Roleplay Training: <scenario name>`.
pub fn feedback_guideline(scenario: &Scenario, title: &str, feedback: &str) -> Guideline {
    let title = match title.trim() {
        "" => format!("Roleplay Training: {}", scenario.name),
        t => t.to_string(),
    };
    let content = format!(
        "{}\n\n**Context:**\n- Scenario: {}\n- Customer Type: {}\n- Training Session Feedback\n\n**Instructions:**\nApply this feedback when handling similar situations in the future.",
        feedback.trim(),
        scenario.name,
        scenario.customer_type
    );
    Guideline {
        id: Uuid::new_v4().to_string(),
        category: "roleplay".to_string(),
        title,
        content,
    }
}

/// Persona lookup used when building opening prompts.
pub fn persona_for(scenario: &Scenario) -> Option<Persona> {
    catalog::persona(&scenario.customer_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ScenarioDifficulty;

    fn scenario(customer_type: &str) -> Scenario {
        Scenario {
            id: Uuid::new_v4(),
            role: StaffRole::CustomerService,
            name: "Delayed Shipment".into(),
            description: "Manage delivery delay complaints".into(),
            situation: "Order is late and customer is upset".into(),
            customer_type: customer_type.into(),
            success_criteria: vec!["Acknowledged frustration".into(), "Provided update".into()],
            duration_mins: 15,
            difficulty: ScenarioDifficulty::Advanced,
        }
    }

    fn ctx<'a>(
        scenario: &'a Scenario,
        memory: &'a TrainingMemory,
        corrections: &'a [String],
        history: &'a [Message],
    ) -> StaffPromptContext<'a> {
        StaffPromptContext {
            staff_name: "Dr. Sakura",
            staff_role: StaffRole::CustomerService,
            scenario,
            memory,
            corrections,
            knowledge_base: &[],
            guidelines: &[],
            history,
        }
    }

    #[test]
    fn staff_prompt_lists_corrections_verbatim() {
        let scenario = scenario("angry");
        let mut memory = TrainingMemory::default();
        memory.append("angry", "don't mention product X");
        let corrections = memory.relevant("angry");
        let prompt = staff_prompt(&ctx(&scenario, &memory, &corrections, &[]));

        assert!(prompt.contains("1. CORRECTION REQUIRED: don't mention product X"));
        assert!(prompt.contains("Scenario: angry\nLessons:\n  • don't mention product X"));
        assert!(prompt.contains("- Acknowledged frustration\n- Provided update"));
    }

    #[test]
    fn staff_prompt_omits_empty_sections() {
        let scenario = scenario("confused");
        let memory = TrainingMemory::default();
        let prompt = staff_prompt(&ctx(&scenario, &memory, &[], &[]));
        assert!(!prompt.contains("CORRECTION REQUIRED"));
        assert!(!prompt.contains("KNOWLEDGE BASE -"));
        assert!(!prompt.contains("RECENT CONVERSATION"));
        assert!(prompt.contains("ANTI-HALLUCINATION"));
    }

    #[test]
    fn staff_prompt_includes_history_knowledge_and_roleplay_guidelines_only() {
        let scenario = scenario("confused");
        let memory = TrainingMemory::default();
        let session_id = Uuid::new_v4();
        let history = vec![
            Message::new(session_id, Sender::Customer, "Where is my order?"),
            Message::new(session_id, Sender::Staff, "Let me check."),
        ];
        let knowledge = vec![KnowledgeEntry {
            id: "k1".into(),
            category: "Shipping".into(),
            content: "Orders ship within 2 days".into(),
            topic: Some("Delivery".into()),
            keywords: vec![],
        }];
        let guidelines = vec![
            Guideline {
                id: "g1".into(),
                category: "roleplay".into(),
                title: "Be calm".into(),
                content: "Never argue".into(),
            },
            Guideline {
                id: "g2".into(),
                category: "livechat".into(),
                title: "Emoji policy".into(),
                content: "Use emoji".into(),
            },
        ];
        let mut context = ctx(&scenario, &memory, &[], &history);
        context.knowledge_base = &knowledge;
        context.guidelines = &guidelines;
        let prompt = staff_prompt(&context);

        assert!(prompt.contains("Customer: Where is my order?\nStaff: Let me check."));
        assert!(prompt.contains("- [Shipping] Delivery: Orders ship within 2 days"));
        assert!(prompt.contains("**Be calm**\nNever argue"));
        assert!(!prompt.contains("Emoji policy"));
    }

    #[test]
    fn revision_prompt_detects_length_cues() {
        assert!(wants_shorter("Use fewer words, be more CONCISE"));
        assert!(wants_longer("please elaborate"));
        assert!(!wants_shorter("more detail please"));

        let scenario = scenario("angry");
        let memory = TrainingMemory::default();
        let revision = Revision {
            customer_question: "Why is it late?",
            previous_response: "one two three four",
            feedback: "make it shorter",
        };
        let prompt = revision_prompt(&ctx(&scenario, &memory, &[], &[]), &revision);
        assert!(prompt.contains("Your previous response was 4 words."));
        assert!(prompt.contains("cut it by at least 50%"));
        assert!(!prompt.contains("at least 2x longer"));
        assert!(prompt.contains("\"make it shorter\""));
    }

    #[test]
    fn customer_prompt_only_sees_recent_history() {
        let scenario = scenario("angry");
        let session_id = Uuid::new_v4();
        let history: Vec<Message> = (0..6)
            .map(|i| Message::new(session_id, Sender::Customer, format!("msg {i}")))
            .collect();
        let prompt = customer_prompt(&scenario, "We will refund you.", &history, 3);
        assert!(!prompt.contains("msg 1"));
        assert!(prompt.contains("msg 2"));
        assert!(prompt.contains("turn 3"));
        assert!(prompt.contains("VERY FRUSTRATED"));
        assert!(prompt.contains("\"We will refund you.\""));
    }

    #[test]
    fn knowledge_selection_falls_back_to_everything() {
        let kb = vec![
            KnowledgeEntry {
                content: "Hydrating serum for dry skin".into(),
                ..Default::default()
            },
            KnowledgeEntry {
                content: "Shipping takes two days".into(),
                keywords: vec!["delivery".into()],
                ..Default::default()
            },
        ];
        assert_eq!(select_knowledge(&kb, "Is the serum good?").len(), 1);
        assert_eq!(select_knowledge(&kb, "When is delivery?")[0].content, kb[1].content);
        assert_eq!(select_knowledge(&kb, "hello").len(), 2);
    }

    #[test]
    fn knowledge_selection_ignores_punctuation_and_blank_keywords() {
        let kb = vec![
            KnowledgeEntry {
                content: "Premium plan price is listed on the pricing page".into(),
                ..Default::default()
            },
            KnowledgeEntry {
                content: "Returns within 30 days".into(),
                keywords: vec!["".into(), "  ".into()],
                ..Default::default()
            },
        ];
        let picked = select_knowledge(&kb, "Price?");
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].content, kb[0].content);
    }

    #[test]
    fn history_skips_error_entries() {
        let session_id = Uuid::new_v4();
        let failed = Message::new(session_id, Sender::Staff, "❌ TRAINING ERROR: timeout").with_metadata(
            crate::domain::MessageMetadata {
                error: true,
                ..Default::default()
            },
        );
        let history = vec![
            Message::new(session_id, Sender::Customer, "Where is my order?"),
            failed,
        ];
        assert_eq!(format_history(&history), "Customer: Where is my order?");

        let prompt = customer_prompt(&scenario("angry"), "Sorry about that.", &history, 2);
        assert!(!prompt.contains("TRAINING ERROR"));
    }

    #[test]
    fn feedback_becomes_a_roleplay_guideline() {
        let scenario = scenario("angry");
        let guideline = feedback_guideline(&scenario, "  ", "Apologise before explaining.");
        assert_eq!(guideline.category, "roleplay");
        assert_eq!(guideline.title, "Roleplay Training: Delayed Shipment");
        assert!(guideline.content.starts_with("Apologise before explaining.\n\n**Context:**"));
        assert!(guideline.content.contains("- Customer Type: angry"));
        assert!(guideline.applies_to_roleplay());
    }
}

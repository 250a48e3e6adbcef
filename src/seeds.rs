//! Built-in scenarios: three per level, plus a per-level fallback.

use crate::domain::{Scenario, ScenarioSource, SkillLevel};

#[allow(clippy::too_many_arguments)]
fn preset(
  id: &str,
  title: &str,
  description: &str,
  goal: &str,
  context: &str,
  product: &str,
  hints: &[&str],
  example_good: &str,
) -> Scenario {
  Scenario {
    id: id.into(),
    title: title.into(),
    description: description.into(),
    goal: goal.into(),
    context: context.into(),
    product: product.into(),
    hints: hints.iter().map(|h| h.to_string()).collect(),
    example_good: example_good.into(),
    source: ScenarioSource::Preset,
  }
}

/// The curated catalog. Also used as few-shot examples for generation.
pub fn seed_scenarios() -> Vec<Scenario> {
  vec![
    // beginner
    preset(
      "b1",
      "Email Summarization in Outlook",
      "You need to catch up on a long email thread about the Q4 marketing campaign.",
      "Get a concise summary of the key decisions and action items",
      "You've been out of office for a week and there's a 15-email thread in your inbox",
      "Outlook Copilot",
      &["Be specific about what you want summarized", "Mention action items", "Consider timeframe"],
      "Summarize the key decisions and action items from the Q4 marketing campaign email thread from the past week",
    ),
    preset(
      "b2",
      "Document Formatting in Word",
      "You have a 10-page report that needs professional formatting.",
      "Apply consistent formatting throughout the document",
      "The document has inconsistent fonts, spacing, and heading styles",
      "Word Copilot",
      &["Specify what elements to format", "Mention consistency", "Be clear about style preferences"],
      "Apply consistent professional formatting to this report: use Arial 11pt for body text, Arial 14pt bold for headings, 1.15 line spacing, and ensure uniform margins",
    ),
    preset(
      "b3",
      "Meeting Preparation in Teams",
      "You have an upcoming team meeting about project status.",
      "Create a meeting agenda based on recent discussions",
      "You need to prepare for a 1-hour weekly sync meeting",
      "Teams Copilot",
      &["Mention the meeting purpose", "Reference past discussions", "Specify time allocation"],
      "Create a 1-hour meeting agenda for our weekly project sync, including status updates, blockers, and next steps based on last week's action items",
    ),
    // intermediate
    preset(
      "i1",
      "Data Analysis in Excel",
      "You have sales data for Q1-Q3 and need to identify trends.",
      "Generate insights about sales performance and create visualizations",
      "Dataset includes sales by region, product category, and month",
      "Excel Copilot",
      &["Specify what insights you need", "Mention visualization preferences", "Include comparative analysis"],
      "Analyze Q1-Q3 sales data to identify top-performing regions and product categories. Create a pivot table showing monthly trends and a chart comparing regional performance. Highlight any concerning patterns.",
    ),
    preset(
      "i2",
      "Presentation Creation in PowerPoint",
      "You need to create a presentation for executive stakeholders.",
      "Generate a compelling deck about project ROI",
      "You have project metrics, budget data, and timeline information",
      "PowerPoint Copilot",
      &["Define your audience", "Specify content structure", "Mention data sources", "Include visual requirements"],
      "Create a 10-slide executive presentation on Project Phoenix's ROI. Include: executive summary, problem statement, solution overview, key metrics (cost savings, efficiency gains), timeline, risks, and next steps. Use our corporate template with data visualizations. Target audience: C-suite executives.",
    ),
    preset(
      "i3",
      "Cross-Product Workflow",
      "You need to compile information from multiple sources.",
      "Create a comprehensive status report using data from Teams, Outlook, and SharePoint",
      "Weekly status report due to management",
      "Microsoft 365 Copilot",
      &["Mention all data sources", "Specify output format", "Include time range", "Define key sections"],
      "Create a weekly status report for the Data Migration project by synthesizing information from: Teams channel discussions, email threads with 'Data Migration' in subject from past week, and updates from the SharePoint project site. Include sections: accomplishments, challenges, metrics, and next week's priorities. Format as a Word document.",
    ),
    // advanced
    preset(
      "a1",
      "Strategic Analysis in Business Chat",
      "Senior leadership wants competitive analysis for strategic planning.",
      "Generate comprehensive competitive intelligence report",
      "Need to analyze competitors, market trends, and strategic recommendations",
      "Microsoft 365 Copilot (Business Chat)",
      &[
        "Define scope clearly",
        "Specify analysis framework",
        "Mention multiple data sources",
        "Include strategic recommendations",
        "Define output structure",
      ],
      "Conduct a competitive analysis for our SaaS product in the CRM space. Analyze: 1) Top 5 competitors' feature sets, pricing, and market positioning (search recent industry reports in SharePoint 'Market Research' folder). 2) Our differentiation opportunities based on customer feedback from past 6 months (Outlook and Teams). 3) Market trends from analyst reports. 4) Strategic recommendations with 3-year roadmap implications. Deliverable: 5-page Word report with executive summary, SWOT analysis, competitive matrix, and prioritized recommendations.",
    ),
    preset(
      "a2",
      "Complex Automation Workflow",
      "Automate a multi-step business process across Microsoft 365.",
      "Design and document an automated workflow for customer onboarding",
      "Process involves Forms, SharePoint, Teams, and Outlook",
      "Power Automate + Copilot",
      &[
        "Map entire process",
        "Specify each integration point",
        "Include error handling",
        "Define success metrics",
        "Consider security/compliance",
      ],
      "Design an automated customer onboarding workflow: 1) When Microsoft Forms 'New Customer' is submitted, create SharePoint folder with customer name. 2) Auto-generate welcome email via Outlook with onboarding checklist. 3) Create Teams channel for customer project and invite relevant team members based on service tier. 4) Set up recurring check-in reminders in Teams for account manager. Include error notifications to admin team, compliance checks for data fields, and dashboard showing onboarding completion rates. Document each step with trigger conditions and fallback procedures.",
    ),
    preset(
      "a3",
      "Enterprise Knowledge Synthesis",
      "Create a comprehensive knowledge base article from scattered information.",
      "Synthesize tribal knowledge into structured documentation",
      "Information is spread across Teams chats, emails, SharePoint docs, and meeting transcripts",
      "Microsoft 365 Copilot",
      &[
        "Define knowledge domain",
        "Specify all sources",
        "Include structure requirements",
        "Mention verification needs",
        "Consider audience and accessibility",
      ],
      "Create a comprehensive 'Cloud Migration Best Practices' knowledge base article by synthesizing information from: 1) Past 12 months Teams 'Cloud Engineering' channel discussions tagged 'migration'. 2) Email threads from cloudops@company.com with subject containing 'migration lessons'. 3) SharePoint 'Post-Mortem' folder documents. 4) Recorded meeting transcripts from monthly architecture reviews. Structure: Executive Summary, Prerequisites, Step-by-step Process, Common Pitfalls & Solutions, Tooling Recommendations, Security Checklist, Case Studies (2-3 internal examples), FAQs. Include inline code examples, architecture diagrams descriptions, and cross-references to related docs. Target audience: intermediate-to-advanced cloud engineers. Verify all technical recommendations with the latest internal standards from SharePoint 'Governance' site.",
    ),
  ]
}

/// Absolute last resort when a level has no scenario at all.
pub fn fallback_scenario(level: SkillLevel) -> Scenario {
  let mut title = level.as_str().to_string();
  if let Some(first) = title.get_mut(0..1) {
    first.make_ascii_uppercase();
  }
  Scenario {
    id: format!("{}99", level.id_prefix()),
    title: format!("Custom {title} Challenge"),
    description: format!("A {level} level Microsoft 365 Copilot scenario for your practice."),
    goal: "Practice your prompt engineering skills".into(),
    context: "You need to create an effective prompt for this scenario".into(),
    product: "Microsoft 365 Copilot".into(),
    hints: vec![
      "Be specific in your request".into(),
      "Provide clear context".into(),
      "Include desired output format".into(),
    ],
    example_good: format!(
      "Create a {level} level prompt for Microsoft 365 Copilot that includes specific context and clear objectives"
    ),
    source: ScenarioSource::Fallback,
  }
}

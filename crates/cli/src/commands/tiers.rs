//! `tierwise tiers`: Show the tier table and skill mapping.

use tierwise_config::AppConfig;
use tierwise_core::skill::Skill;
use tierwise_core::tier::TierTable;

const BUILTIN_SKILLS: [&str; 9] = [
    "correcteur",
    "jury",
    "synthese",
    "tuteur",
    "chat",
    "explicateur",
    "quiz",
    "formateur",
    "titreur",
];

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    print!("{}", render(&config.tier_table()));

    let overrides = config.skill_overrides();
    println!();
    println!("  Skill → tier");
    for name in BUILTIN_SKILLS {
        let skill = Skill::parse(name);
        let tier = overrides
            .get(&skill)
            .copied()
            .unwrap_or_else(|| skill.default_tier());
        let marker = if overrides.contains_key(&skill) { " (override)" } else { "" };
        println!("    {name:<12} {tier}{marker}");
    }
    for (skill, tier) in &overrides {
        if matches!(skill, Skill::Other(_)) {
            println!("    {:<12} {tier} (override)", skill.name());
        }
    }

    Ok(())
}

/// Render the tier table, one row per tier in cascade order.
fn render(table: &TierTable) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "  {:<10} {:<32} {:>10} {:>7} {:>10} {:>6}\n",
        "tier", "model", "max input", "chunks", "tok/chunk", "turns"
    ));
    for profile in table.iter() {
        let b = profile.budget;
        out.push_str(&format!(
            "  {:<10} {:<32} {:>10} {:>7} {:>10} {:>6}\n",
            profile.tier.as_str(),
            profile.model,
            b.max_input_tokens,
            b.max_chunks,
            b.max_tokens_per_chunk,
            b.max_turns
        ));
    }
    out
}

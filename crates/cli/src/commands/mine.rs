//! `stepwise mine`: Find repeated action sequences in history.

use super::open_api;

pub async fn run(
    window: Option<usize>,
    promote: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let api = open_api().await?;
    let patterns = api.mine_patterns(window).await?;

    if patterns.is_empty() {
        println!("🔍 No repeated sequences found.");
        return Ok(());
    }

    println!("🔍 Patterns ({}):", patterns.len());
    for (i, p) in patterns.iter().enumerate() {
        println!(
            "  {i:>2}. {:<48} ×{:<4} confidence {:.2}",
            p.sequence.join(" → "),
            p.count,
            p.confidence
        );
    }

    if let Some(name) = promote {
        let draft = api.promote_pattern(&patterns[0], &name).await?;
        println!();
        println!("📝 Draft macro '{}' ({}) created from pattern 0", draft.name, draft.id);
        println!("   Fill in its step params, then set status = active to run it.");
    }
    Ok(())
}

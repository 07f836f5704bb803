//! Ask command implementation

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use spendlens_core::{
    narrate_or_template, AnalysisConfig, AnalysisEngine, AskRouter, NarrationRequest, Narrator,
    OllamaNarrator, TemplateNarrator,
};

use super::load_ledger;

pub async fn cmd_ask(
    config: AnalysisConfig,
    file: &Path,
    question: &str,
    narrate: bool,
) -> Result<()> {
    let question = question.trim();
    if question.is_empty() {
        anyhow::bail!("Question must not be empty");
    }

    let ledger = Arc::new(load_ledger(file)?);
    let router = AskRouter::new(&config);
    let engine = AnalysisEngine::new(config);
    let run = engine.analyze(ledger).await.context("Analysis failed")?;

    let response = router.route(question, &run);

    let narrator: Box<dyn Narrator> = match (narrate, OllamaNarrator::from_env()) {
        (true, Some(ollama)) => {
            println!("   🤖 Narrating with {}", ollama.model());
            Box::new(ollama)
        }
        (true, None) => {
            println!("   💡 Tip: Set OLLAMA_HOST to narrate answers with a local model");
            Box::new(TemplateNarrator)
        }
        (false, _) => Box::new(TemplateNarrator),
    };
    let request = NarrationRequest::for_answer(question, &response);
    let answer = narrate_or_template(narrator.as_ref(), &request).await;

    println!();
    println!("❓ {}", question);
    println!("   {}", answer);
    println!();
    if response.fallback {
        println!("   (no exact computation matched this question)");
    } else {
        println!(
            "   Tool: {}  │  Confidence: {}",
            response.tool_used, response.confidence
        );
        println!("   Method: {}", response.methodology);
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&response.answer_payload)?);

    Ok(())
}

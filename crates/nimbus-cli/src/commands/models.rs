//! `nimbus models` -- show the model catalog.

use nimbus_llm::OllamaProvider;

pub async fn run(config_path: Option<&str>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let ollama = OllamaProvider::new(config.providers.ollama.base_url.clone());
    let families = ollama.available_models();

    println!("Text:");
    for model in &families.text {
        println!("  {model}");
    }
    println!("Image:");
    for model in &families.image {
        println!("  {model}");
    }
    println!("Video:");
    for model in &families.video {
        println!("  {model}");
    }

    match ollama.list_models().await {
        Ok(installed) if installed.is_empty() => {
            println!("\nOllama daemon reachable, no models installed yet.");
        }
        Ok(installed) => {
            println!("\nInstalled on daemon:");
            for model in installed {
                println!("  {model}");
            }
        }
        Err(_) => println!(
            "\nOllama daemon not reachable at {}.",
            config.providers.ollama.base_url
        ),
    }

    println!("\nRouting: {} (primary)", config.routing.primary_model);
    for fallback in &config.routing.fallback_models {
        println!("         {fallback} (fallback)");
    }

    Ok(())
}

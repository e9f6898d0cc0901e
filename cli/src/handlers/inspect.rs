use std::path::Path;

use console::Style;
use ortmodel::config::{ModelFiles, NormalizedConfig};
use tracing::warn;

fn describe(value: Option<usize>) -> String {
    value.map_or_else(|| "unknown".to_string(), |value| value.to_string())
}

pub fn handle_inspect(model_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let files = ModelFiles::new(model_path);
    let config = NormalizedConfig::from_file(&files.config())?;

    let title = Style::new().bold();
    let label = Style::new().dim();
    println!("{}", title.apply_to(model_path.display()));
    println!("{} {}", label.apply_to("model type:"), config.model_type);
    println!("{} {}", label.apply_to("hidden size:"), config.hidden_size);
    println!("{} {} x {}", label.apply_to("attention heads:"), config.num_attention_heads, config.head_dim());
    println!("{} {}", label.apply_to("layers:"), describe(config.num_layers));
    println!("{} {}", label.apply_to("vocabulary:"), describe(config.vocab_size));
    println!("{} {}", label.apply_to("labels:"), config.num_labels);

    if files.is_encoder_decoder() {
        let cached = if files.decoder_with_past().is_some() {
            "with cached decoder"
        } else {
            "without cached decoder"
        };
        println!("{} encoder-decoder, {cached}", label.apply_to("graphs:"));
    } else if files.model().is_file() {
        println!("{} standalone", label.apply_to("graphs:"));
    } else {
        warn!(path = %model_path.display(), "no graph files found");
        println!("{} none", label.apply_to("graphs:"));
    }
    Ok(())
}

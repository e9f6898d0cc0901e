use std::path::Path;

use console::Style;
use ortmodel::{
    DataType,
    binding::{OutputRole, OutputSpec, ShapeParams, output_shape},
    config::{ModelFiles, NormalizedConfig},
    runners::Task,
};

pub fn handle_plan(
    model_path: &Path,
    task: &str,
    params: &ShapeParams,
) -> Result<(), Box<dyn std::error::Error>> {
    let task: Task = task.parse()?;
    let config = NormalizedConfig::from_file(&ModelFiles::new(model_path).config())?;

    let mut specs = task.output_specs(config.num_labels, params);
    if task.is_encoder_decoder() {
        for layer in 0..config.num_layers.unwrap_or(0) {
            specs.push(OutputSpec::new(format!("present.{layer}.decoder.key"), OutputRole::SelfAttentionCache));
            specs.push(OutputSpec::new(format!("present.{layer}.decoder.value"), OutputRole::SelfAttentionCache));
            specs.push(OutputSpec::new(format!("present.{layer}.encoder.key"), OutputRole::CrossAttentionCache));
            specs.push(OutputSpec::new(format!("present.{layer}.encoder.value"), OutputRole::CrossAttentionCache));
        }
    }
    if specs.is_empty() {
        println!("{task} outputs are discovered from the graph at load time");
        return Ok(());
    }

    let dim = Style::new().dim();
    let mut total_bytes = 0;
    for spec in specs {
        let shape = output_shape(&config, spec.role, params)?;
        // The graph is not loaded here, so outputs are sized as `f32`.
        total_bytes += shape.iter().product::<usize>() * DataType::F32.size_in_bytes();
        println!("{:<32} {:<24} {:?}", spec.name, dim.apply_to(spec.role.name()), shape);
    }
    println!("{} {:.2} MiB", Style::new().bold().apply_to("total:"), total_bytes as f64 / 1024.0 / 1024.0);
    Ok(())
}

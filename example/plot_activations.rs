use fanet::error::Result;
use fanet::plot::plot_activations::plot_all_activations;

const OUTPUT_DIR: &str = ".";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    for path in plot_all_activations(OUTPUT_DIR)? {
        println!("Saved {}", path.display());
    }
    Ok(())
}

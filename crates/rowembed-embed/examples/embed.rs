use rowembed_core::config::ModelConfig;
use rowembed_core::traits::Embedder;
use rowembed_embed::load_embedder;

fn main() -> anyhow::Result<()> {
    let (embedder, device) = load_embedder(&ModelConfig::default())?;
    let texts = vec!["hello world".to_string(), "rust embeddings".to_string()];
    let embs = embedder.embed_batch(&texts)?;
    println!("B={} dim={} device={}", embs.len(), embedder.dim(), device);
    Ok(())
}

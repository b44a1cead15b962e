#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    use gpu_life::config::LifeConfig;

    gpu_life::init_logging();
    gpu_life::run(LifeConfig::default())
}

// The web build starts from the wasm-bindgen start hook in the library.
#[cfg(target_arch = "wasm32")]
fn main() {}

//! Loads files named on the command line.
//!
//! Fallback locations of one resource are separated with `|`,
//! e.g. `fs_load cdn/app.js|local/app.js lib.js`.
//! Set `HEADLOAD_CONFIG` to a TOML file to tune the loader.

use {
    eyre::WrapErr as _,
    headload::{
        assets::{Descriptor, FsSource, Loader},
        config::LoaderConfig,
        task::Executor,
    },
};

fn main() -> eyre::Result<()> {
    headload::install_eyre_handler();
    headload::install_tracing_subscriber();

    let config = match std::env::var_os("HEADLOAD_CONFIG") {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .wrap_err_with(|| format!("Failed to read {:?}", path))?;
            LoaderConfig::from_toml_str(&text)?
        }
        None => LoaderConfig::default(),
    };

    let descriptors: Vec<Descriptor> = std::env::args()
        .skip(1)
        .map(|arg| Descriptor::sources(arg.split('|').map(str::to_owned)))
        .collect();

    if descriptors.is_empty() {
        eyre::bail!("No files to load");
    }

    let mut executor = Executor::new();
    let loader = Loader::builder(executor.spawner())
        .with_source(FsSource::new())
        .with_config(config)
        .build();

    let batch = loader.submit_with(descriptors.clone(), || {
        tracing::info!("Batch loaded");
    });

    // Timers of the readiness gate need a tokio runtime.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let result = runtime.block_on(executor.run_until(batch));

    for descriptor in &descriptors {
        if let Some(status) = descriptor.name().and_then(|name| loader.status(name)) {
            println!(
                "{}: {:?} {}",
                status.name,
                status.state,
                status.location.as_deref().unwrap_or("-"),
            );
        }
    }

    result.wrap_err("Failed to load all files")?;
    Ok(())
}

use nuthatch_runtime::{
    config::{BackendKind, RuntimeConfig},
    headless::{self, HeadlessBackend, HeadlessSeat},
    runtime::Runtime,
    ui::{DelegateUi, InitProperties, ObjectCreator},
    NativeHandle,
};
use tracing_subscriber::{fmt, EnvFilter};

fn main() {
    let config = RuntimeConfig::from_env();

    // Setup logging
    let fallback = config
        .as_ref()
        .map(|config| config.log_filter.clone())
        .unwrap_or_else(|_| "info".into());
    fmt()
        .compact()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .init();

    tracing::info!("🐦 Nuthatch runtime starting...");

    let result = config.and_then(|config| match config.backend {
        BackendKind::Headless => run_headless(config),
        BackendKind::Winit => run_winit(config),
    });
    if let Err(err) = result {
        tracing::error!("Failed to initialize compositor: {:#}", err);
        std::process::exit(1);
    }
}

fn run_headless(config: RuntimeConfig) -> anyhow::Result<()> {
    let ui = DelegateUi::new(
        ObjectCreator::new(|output: NativeHandle, props: &InitProperties| {
            tracing::info!("Output view for {} at x={}", output, props.int("x").unwrap_or_default());
            output
        }),
        ObjectCreator::new(|surface: NativeHandle, props: &InitProperties| {
            tracing::info!("🪟 {} item for {}", props.text("type").unwrap_or("surface"), surface);
            surface
        }),
    );
    let seat = HeadlessSeat::new(config.seat_name.clone());
    let runtime = Runtime::new(config, HeadlessBackend::new(), Box::new(ui), Box::new(seat));

    let report = headless::run_session(runtime, headless::demo_script())?;
    tracing::info!(
        "✅ Session finished: {} steps, {} frames, {} faults",
        report.steps,
        report.frames_rendered,
        report.faults.len()
    );
    Ok(())
}

#[cfg(feature = "winit")]
fn run_winit(config: RuntimeConfig) -> anyhow::Result<()> {
    nuthatch_runtime::winit::init_winit(config)
}

#[cfg(not(feature = "winit"))]
fn run_winit(_config: RuntimeConfig) -> anyhow::Result<()> {
    anyhow::bail!("the winit backend needs the `winit` feature")
}

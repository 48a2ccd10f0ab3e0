use std::{error::Error, path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use observatory_control::{
    config::ObservatoryConfig,
    dome_geometry::DomeGeometry,
    dome_model::DomeController,
    mock_controller::mock_mount::run_mock_mount,
    mount_model::MountDriver,
    pointing::PointingSource,
};

#[derive(Parser)]
#[command(name = "observatory_control")]
#[command(about = "Mount driver and dome synchronization service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a simulated mount over TCP
    MockMount {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(short, long, default_value = "3492")]
        port: u16,
    },
    /// Connect to the mount and run the dome controller until Ctrl-C
    Run {
        #[arg(short, long, default_value = "observatory.toml")]
        config: PathBuf,
    },
    /// Print mount identity, status and pointing
    Status {
        #[arg(short, long, default_value = "observatory.toml")]
        config: PathBuf,
    },
    /// Write a default configuration file
    Config {
        #[arg(short, long, default_value = "observatory.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::MockMount { host, port } => run_mock_mount(&host, port).await?,
        Commands::Run { config } => run(ObservatoryConfig::load_from_file(config)?).await?,
        Commands::Status { config } => status(ObservatoryConfig::load_from_file(config)?).await?,
        Commands::Config { output } => {
            ObservatoryConfig::default().save_to_file(&output)?;
            log::info!("Wrote default configuration to {}.", output.display());
        }
    }

    Ok(())
}

async fn run(config: ObservatoryConfig) -> Result<(), Box<dyn Error>> {
    let mount = Arc::new(MountDriver::new(config.mount_connection()));
    mount.connect().await?;
    log::info!("Mount status: {}", mount.get_status().await?);

    let pointing: Arc<dyn PointingSource> = mount.clone();
    let dome = DomeController::new(
        config.dome.clone(),
        DomeGeometry::new(config.geometry.clone()),
        pointing,
    )?;
    if config.dome.sync_on_start {
        dome.set_sync(true).await;
    }

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down.");

    dome.close().await;
    mount.close().await;

    Ok(())
}

async fn status(config: ObservatoryConfig) -> Result<(), Box<dyn Error>> {
    let mount = MountDriver::new(config.mount_connection());
    mount.connect().await?;

    println!("Product:   {}", mount.product_name().await?);
    println!("Firmware:  {} ({})", mount.firmware_number().await?, mount.firmware_date().await?);
    println!("Status:    {}", mount.get_status().await?);
    println!("Tracking:  {}", mount.is_tracking().await?);
    println!("Pier side: {}", mount.pier_side().await?);
    let (ra, dec) = mount.get_mount_ra_dec().await?;
    println!("RA/Dec:    {ra} {dec}");
    let (alt, az) = mount.get_mount_alt_az().await?;
    println!("Alt/Az:    {alt} {az}");
    println!("Sidereal:  {}", mount.get_sidereal_time().await?);

    mount.close().await;
    Ok(())
}

use clap::Parser;
use sensornet::utils::logger;
use sensornet::{
    CliConfig, Command, EnvTasks, EnvironmentSettings, ProcessRunner, SensorNetError,
    SensorNetwork, Settings,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    if cli.log_json {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::debug!("CLI config: {:?}", cli);

    let settings = match cli.settings() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    let command = cli.command();
    if let Err(e) = execute(&command, settings).await {
        tracing::error!(
            "❌ {:?} failed: {} (Category: {:?}, Severity: {:?})",
            command,
            e,
            e.category(),
            e.severity()
        );
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());

        let exit_code = e.exit_code();
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

async fn execute(command: &Command, settings: Settings) -> Result<(), SensorNetError> {
    match command {
        Command::Run { json } => {
            let network = SensorNetwork::open(settings.network.clone())?;
            let timeout = settings.network.discovery_timeout;
            let report = sensornet::survey_and_stop(&network, timeout).await?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report);
            }
        }
        Command::Clean => {
            let report = env_tasks(settings).clean().await?;
            println!(
                "✅ Removed {} bytecode files and {} cache directories",
                report.files_removed, report.dirs_removed
            );
        }
        Command::Depends => {
            env_tasks(settings).depends().await?;
            println!("✅ Dependencies installed");
        }
        Command::Venv => {
            let tasks = env_tasks(settings);
            tasks.venv().await?;
            println!("✅ Environment ready at {}", tasks.venv_path().display());
        }
        Command::Reset => {
            let tasks = env_tasks(settings);
            if tasks.reset().await? {
                println!("✅ Removed {}", tasks.venv_path().display());
            } else {
                println!("✅ Nothing to reset");
            }
        }
    }
    Ok(())
}

fn env_tasks(settings: Settings) -> EnvTasks<ProcessRunner, EnvironmentSettings> {
    EnvTasks::new(ProcessRunner::new(), settings.environment)
}

use clap::Parser;
use keeper_cli::{Cli, CliApp, Commands, report_error, run_init, setup_logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // guard 持有到退出前，保证文件日志写完
    let log_guard = setup_logging(cli.verbose);
    let code = run(cli).await;
    drop(log_guard);

    std::process::exit(code);
}

async fn run(cli: Cli) -> i32 {
    // `init` 不需要预先加载配置
    if let Commands::Init { force } = cli.command {
        return match run_init(&cli.config, force) {
            Ok(()) => 0,
            Err(e) => {
                report_error(&e);
                1
            }
        };
    }

    let app = match CliApp::new(&cli.config) {
        Ok(app) => app,
        Err(e) => {
            report_error(&e);
            return 1;
        }
    };

    match app.run_command(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            report_error(&e);
            1
        }
    }
}

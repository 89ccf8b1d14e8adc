//! Expresso - An Express-Style Web Framework for Rust
//!
//! This is the demo server entry point. It wires up a small application
//! with logging middleware, parameterized routes, a JSON echo endpoint,
//! a mounted sub-router, and error middleware, then serves it.

use expresso::builtin;
use expresso::routing::{DispatchError, Flow, Middleware, Router};
use expresso::App;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Maximum concurrently handled connections
    workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: expresso::DEFAULT_HOST.to_string(),
            port: expresso::DEFAULT_PORT,
            workers: expresso::app::default_workers(),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    if i + 1 < args.len() {
                        config.host = args[i + 1].clone();
                        i += 2;
                    } else {
                        eprintln!("Error: --host requires a value");
                        std::process::exit(1);
                    }
                }
                "--port" | "-p" => {
                    if i + 1 < args.len() {
                        config.port = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid port number");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --port requires a value");
                        std::process::exit(1);
                    }
                }
                "--workers" | "-w" => {
                    if i + 1 < args.len() {
                        config.workers = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid worker count");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --workers requires a value");
                        std::process::exit(1);
                    }
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("Expresso version {}", expresso::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn print_help() {
    println!(
        r#"
Expresso - An Express-Style Web Framework for Rust

USAGE:
    expresso [OPTIONS]

OPTIONS:
    -h, --host <HOST>        Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>        Port to listen on (default: 3000)
    -w, --workers <COUNT>    Max concurrent connections (default: 4 per core)
    -v, --version            Print version information
        --help               Print this help message

EXAMPLES:
    expresso                       # Start on 127.0.0.1:3000
    expresso --port 8080           # Start on port 8080
    expresso --host 0.0.0.0        # Listen on all interfaces

TRYING IT:
    $ curl http://127.0.0.1:3000/
    Welcome to Expresso
    $ curl http://127.0.0.1:3000/users/42
    user 42
    $ curl -d '{{"msg":"hi"}}' http://127.0.0.1:3000/echo
"#
    );
}

fn print_banner(config: &Config) {
    println!(
        r#"
        ███████╗██╗  ██╗██████╗ ██████╗ ███████╗███████╗███████╗ ██████╗
        ██╔════╝╚██╗██╔╝██╔══██╗██╔══██╗██╔════╝██╔════╝██╔════╝██╔═══██╗
        █████╗   ╚███╔╝ ██████╔╝██████╔╝█████╗  ███████╗███████╗██║   ██║
        ██╔══╝   ██╔██╗ ██╔═══╝ ██╔══██╗██╔══╝  ╚════██║╚════██║██║   ██║
        ███████╗██╔╝ ██╗██║     ██║  ██║███████╗███████║███████║╚██████╔╝
        ╚══════╝╚═╝  ╚═╝╚═╝     ╚═╝  ╚═╝╚══════╝╚══════╝╚══════╝ ╚═════╝

Expresso v{} - An Express-Style Web Framework for Rust
──────────────────────────────────────────────────────────────
Server started on {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        expresso::VERSION,
        config.bind_address()
    );
}

/// Builds the demo application.
fn demo_app(workers: usize) -> App {
    let mut app = App::with_config(expresso::AppConfig {
        max_workers: workers,
        ..Default::default()
    });

    // Request logger, runs for everything
    app.use_middleware(Middleware::handler(|req, res| async move {
        info!(method = %req.method(), path = %req.path(), client = %req.ip(), "incoming");
        (req, res, Ok(Flow::Next))
    }));

    app.get("/", |req, mut res| async move {
        let result = res.send("Welcome to Expresso").await;
        (req, res, result.map(|_| Flow::Halt).map_err(Into::into))
    });

    app.get("/users/:id", |req, mut res| async move {
        let id = req.param("id").unwrap_or("?").to_string();
        let result = res.send(format!("user {id}")).await;
        (req, res, result.map(|_| Flow::Halt).map_err(Into::into))
    });

    // JSON echo: body parser followed by a handler reading the payload
    app.route(
        Some(expresso::Method::Post),
        "/echo",
        vec![
            builtin::json(),
            Middleware::handler(|req, mut res| async move {
                let result = match &req.payload {
                    Some(expresso::Payload::Json(value)) => res.json(value).await,
                    _ => res.send_status(400).await,
                };
                (req, res, result.map(|_| Flow::Halt).map_err(Into::into))
            }),
        ],
    );

    app.get("/fail", |req, res| async move {
        (req, res, Err(DispatchError::new(503, "demo failure")))
    });

    // Mounted sub-router: /api/health, /api/version
    let mut api = Router::new();
    api.get(
        "/health",
        vec![Middleware::handler(|req, mut res| async move {
            let result = res.json(&serde_json::json!({"status": "ok"})).await;
            (req, res, result.map(|_| Flow::Halt).map_err(Into::into))
        })],
    );
    api.get(
        "/version",
        vec![Middleware::handler(|req, mut res| async move {
            let result = res.send(expresso::VERSION).await;
            (req, res, result.map(|_| Flow::Halt).map_err(Into::into))
        })],
    );
    app.mount("/api", api);

    // Application-level error middleware
    app.use_error(Middleware::error_handler(
        |err: DispatchError, req, mut res| async move {
            res.status(err.status);
            let result = res.send(format!("error: {}", err.message)).await;
            (req, res, result.map(|_| Flow::Halt).map_err(Into::into))
        },
    ));

    app
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Print the banner
    print_banner(&config);

    // Build the demo application and bind
    let app = demo_app(config.workers);
    let server = app.bind(config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    // Set up graceful shutdown
    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received, stopping server...");
    };

    // Main accept loop
    tokio::select! {
        _ = server.run() => {}
        _ = shutdown => {}
    }

    info!("Server shutdown complete");
    Ok(())
}

use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use digitserve::config::{Settings, DEFAULT_CONFIG_FILE};
use digitserve::server;
use digitserve::{Predictor, TorchClassifier};
use std::sync::Arc;
use std::{env, process};

use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: ./digitserve [config file]";

fn get_args() -> String {
    let args: Vec<String> = env::args().collect();
    match args.len() {
        1 => DEFAULT_CONFIG_FILE.into(),
        2 => args[1].clone(),
        _ => {
            println!("{USAGE}");
            process::exit(1);
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config_file = get_args();
    let settings = Settings::load(&config_file)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log.filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("settings: {settings:?}");

    // The classifier is loaded once and shared read-only by every worker
    let classifier = TorchClassifier::load(&settings.model.path)
        .with_context(|| format!("cannot start without a model at {:?}", settings.model.path))?;
    let predictor = web::Data::new(Predictor::new(Arc::new(classifier)));

    let server_settings = settings.server.clone();
    let mut http = HttpServer::new(move || {
        App::new()
            .app_data(predictor.clone())
            .wrap(middleware::Logger::default())
            .wrap(server::cors(&server_settings))
            .configure(server::configure(&server_settings))
    });
    if let Some(workers) = settings.server.workers {
        http = http.workers(workers);
    }

    info!("listening on {}", settings.bind_addr());
    http.bind(settings.bind_addr())?.run().await?;
    Ok(())
}

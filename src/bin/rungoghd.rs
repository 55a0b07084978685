use actix_web::{middleware, web, App, HttpServer};
use log::{error, info};
use std::io;

use rungogh::api::{self, AppState};
use rungogh::config::Config;

fn startup_error(err: rungogh::Error) -> io::Error {
    error!("{}", err);
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(startup_error)?;
    let state = web::Data::new(AppState::from_config(&config).map_err(startup_error)?);

    info!("listening on {} ({:?} storage)", config.bind_addr, config.storage);
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(api::configure)
    })
    .bind(&config.bind_addr)?
    .run()
    .await
}

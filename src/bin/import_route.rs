use getopts::Options;
use std::env;

use rungogh::config::MatchPolicy;
use rungogh::gpx;
use rungogh::routes::RouteService;
use rungogh::store::Stores;
use rungogh::{create_db_pool, database_url};

fn print_usage(program: &str, opts: Options) {
    let brief = format!("Usage: {} [options]", program);
    print!("{}", opts.usage(&brief));
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("u", "uid", "owner user id", "UID");
    opts.optopt("n", "name", "route title", "NAME");
    opts.optopt("g", "gpx", "GPX file", "FILE");
    opts.optopt("i", "image", "art image reference", "URL");
    opts.optflag("h", "help", "print this help menu");
    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            println!("{}", f);
            print_usage(&program, opts);
            return;
        }
    };
    if matches.opt_present("h") {
        print_usage(&program, opts);
        return;
    }
    let uid: Option<i64> = matches.opt_str("u").and_then(|u| u.parse().ok());
    let (uid, name, file) = match (uid, matches.opt_str("n"), matches.opt_str("g")) {
        (Some(uid), Some(name), Some(file)) => (uid, name, file),
        _ => {
            print_usage(&program, opts);
            return;
        }
    };
    let image = matches.opt_str("i").unwrap_or_default();

    let positions = match gpx::read_route_file(&file) {
        Ok(positions) => positions,
        Err(err) => {
            println!("Failed to read {}: {}", file, err);
            return;
        }
    };

    let routes = match database_url().and_then(|url| create_db_pool(&url)) {
        Ok(pool) => RouteService::new(Stores::postgres(pool), MatchPolicy::default()),
        Err(err) => {
            println!("Failed to connect: {}", err);
            return;
        }
    };

    let staged = match routes.stage_route(uid, positions).await {
        Ok(route) => route,
        Err(err) => {
            println!("Failed to store route: {}", err);
            return;
        }
    };
    match routes.finalize_route(uid, staged.id, &name, &image).await {
        Ok(route) => println!(
            "Created route {} with ID {} ({} m, center {:.5}, {:.5})",
            name, route.id, route.distance, route.center_lat, route.center_lng
        ),
        Err(err) => println!("Failed to finalize route {}: {}", staged.id, err),
    }
}

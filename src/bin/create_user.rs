use getopts::Options;
use std::env;

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
    opts.optopt("n", "name", "user name", "NAME");
    opts.optopt("e", "email", "user email", "EMAIL");
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
    let (name, email) = match (matches.opt_str("n"), matches.opt_str("e")) {
        (Some(name), Some(email)) => (name, email),
        _ => {
            print_usage(&program, opts);
            return;
        }
    };

    let stores = match database_url().and_then(|url| create_db_pool(&url)) {
        Ok(pool) => Stores::postgres(pool),
        Err(err) => {
            println!("Failed to connect: {}", err);
            return;
        }
    };
    match stores.users.create_user(&name, &email).await {
        Ok(user) => println!("Created user with ID {}", user.id),
        Err(err) => println!("Failed to create user: {}", err),
    }
}

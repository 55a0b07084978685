use rungogh::{create_db, establish_connection};

fn main() {
    let mut db = match establish_connection() {
        Ok(db) => db,
        Err(err) => {
            println!("Failed to connect: {}", err);
            return;
        }
    };
    match create_db(&mut db) {
        Ok(_) => println!("Schema created"),
        Err(err) => println!("Failed to create DB: {}", err),
    }
}

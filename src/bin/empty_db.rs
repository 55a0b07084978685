use rungogh::{empty_db, establish_connection};

fn main() {
    let mut db = match establish_connection() {
        Ok(db) => db,
        Err(err) => {
            println!("Failed to connect: {}", err);
            return;
        }
    };
    if let Err(err) = empty_db(&mut db) {
        println!("Failed to empty DB: {}", err);
    }
}

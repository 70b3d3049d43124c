//! Generate a merchant API key and its storable hash.
//!
//! The plaintext key is shown once; only the hash goes into `api_keys`.

use payrail::crypto;

fn main() {
    let key = crypto::generate_api_key();
    let hash = crypto::hash_api_key(&key);
    let id = crypto::generate_entity_id();

    println!("api key:  {key}");
    println!("key hash: {hash}");
    println!();
    println!("-- grant it to a merchant:");
    println!(
        "INSERT INTO api_keys (id, key_hash, merchant_id, permissions, active) \
         VALUES ('{id}', '{hash}', '<merchant_id>', '{{\"*\"}}', TRUE);"
    );
}

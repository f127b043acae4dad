//! Offline utility for wrapping a raw Solana private key into an envelope
//! blob (spec §4.1) without ever touching a running engine process.

use clap::{Parser, Subcommand};
use solana_sdk::signature::{Keypair, Signer};
use strategy_engine::crypto::{encrypt_private_key, unwrap_dek, decrypt_pk};

#[derive(Parser)]
#[command(name = "keygen", about = "Wallet envelope key utility")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a fresh keypair and print its envelope blob.
    New {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        wallet_id: String,
        #[arg(long)]
        passphrase: String,
    },
    /// Wrap an existing base58 private key into an envelope blob.
    Wrap {
        #[arg(long)]
        private_key_b58: String,
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        wallet_id: String,
        #[arg(long)]
        passphrase: String,
    },
    /// Decrypt an envelope blob back to a base58 private key, to verify round-tripping.
    Unwrap {
        #[arg(long)]
        blob_json: String,
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        wallet_id: String,
        #[arg(long)]
        passphrase: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::New { user_id, wallet_id, passphrase } => {
            let keypair = Keypair::new();
            let aad = format!("user:{user_id}:wallet:{wallet_id}");
            let blob = encrypt_private_key(&keypair.to_bytes(), &passphrase, &aad, None)?;
            println!("public_key: {}", keypair.pubkey());
            println!("envelope_blob: {}", serde_json::to_string_pretty(&blob)?);
        }
        Command::Wrap { private_key_b58, user_id, wallet_id, passphrase } => {
            let pk = bs58::decode(&private_key_b58).into_vec()?;
            let aad = format!("user:{user_id}:wallet:{wallet_id}");
            let blob = encrypt_private_key(&pk, &passphrase, &aad, None)?;
            println!("envelope_blob: {}", serde_json::to_string_pretty(&blob)?);
        }
        Command::Unwrap { blob_json, user_id, wallet_id, passphrase } => {
            let blob = serde_json::from_str(&blob_json)?;
            let aad = format!("user:{user_id}:wallet:{wallet_id}");
            let dek = unwrap_dek(&blob, &passphrase, &aad)?;
            let pk = decrypt_pk(&blob, dek.as_ref(), &aad)?;
            println!("private_key_b58: {}", bs58::encode(pk.as_slice()).into_string());
        }
    }
    Ok(())
}

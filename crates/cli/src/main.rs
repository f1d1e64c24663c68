use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sha3::{Digest, Sha3_256};
use std::path::{Path, PathBuf};
use wallet_core::{Keychain, PrintableAmount};

const WALLET_FILENAME: &str = "wallet.db";

#[derive(Parser)]
#[command(name = "wallet-cli", about = "Wallet developer CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new wallet store in a directory.
    Create(CreateArgs),
    /// Print the reconciled chain state of a wallet.
    Info(OpenArgs),
    /// List tracked UTXOs.
    Utxos(OpenArgs),
    /// Re-encrypt the store under a new password.
    ChangePassword(ChangePasswordArgs),
}

#[derive(Parser)]
struct CreateArgs {
    #[arg(long)]
    dir: PathBuf,
    #[arg(long)]
    password: String,
    #[arg(long)]
    seed: String,
}

#[derive(Parser)]
struct OpenArgs {
    #[arg(long)]
    dir: PathBuf,
    #[arg(long)]
    password: String,
}

#[derive(Parser)]
struct ChangePasswordArgs {
    #[arg(long)]
    dir: PathBuf,
    #[arg(long)]
    password: String,
    #[arg(long)]
    new_password: String,
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Create(args) => run_create(args),
        Commands::Info(args) => run_info(args),
        Commands::Utxos(args) => run_utxos(args),
        Commands::ChangePassword(args) => run_change_password(args),
    };
    if let Err(err) = result {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn wallet_path(dir: &Path) -> PathBuf {
    dir.join(WALLET_FILENAME)
}

fn open_wallet(args: &OpenArgs) -> Result<Keychain> {
    Keychain::open(wallet_path(&args.dir), &args.password).context("open wallet")
}

fn run_create(args: CreateArgs) -> Result<()> {
    let seed_hash: [u8; 32] = Sha3_256::digest(args.seed.as_bytes()).into();
    Keychain::init(wallet_path(&args.dir), &args.password, &seed_hash)
        .context("create wallet")?;
    println!("created={}", wallet_path(&args.dir).display());
    Ok(())
}

fn run_info(args: OpenArgs) -> Result<()> {
    let keychain = open_wallet(&args)?;
    let state = keychain.get_system_state_id();
    println!("height={}", state.height);
    println!("hash={}", hex::encode(state.hash));
    for address in keychain.addresses() {
        println!(
            "address={} label={} own={}",
            address.wallet_id, address.label, address.own
        );
    }
    Ok(())
}

fn run_utxos(args: OpenArgs) -> Result<()> {
    let keychain = open_wallet(&args)?;
    let mut total = 0u64;
    keychain.visit(|coin| {
        println!(
            "id={} amount={} ({}) status={} maturity={}",
            coin.id,
            coin.amount,
            PrintableAmount(coin.amount),
            coin.status,
            coin.maturity
        );
        total = total.saturating_add(coin.amount);
        true
    });
    println!("total={total}");
    Ok(())
}

fn run_change_password(args: ChangePasswordArgs) -> Result<()> {
    let keychain = Keychain::open(wallet_path(&args.dir), &args.password)
        .context("open wallet")?;
    keychain
        .change_password(&args.new_password)
        .context("change password")?;
    println!("password-changed");
    Ok(())
}

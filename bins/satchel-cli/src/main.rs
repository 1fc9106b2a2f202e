//! satchel: command-line front end for the Satchel wallet engine.
//!
//! Wallet management, address discovery, balance queries and transaction
//! creation against an Esplora-compatible explorer, with the wallet kept in
//! a password-encrypted file.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use bitcoin::{Network, OutPoint};
use clap::{Args, Parser, Subcommand};
use satchel_core::constants::COIN;
use satchel_core::{ChainSource, FeeRate};
use satchel_explorer::EsploraClient;
use satchel_wallet::{
    FeeEstimator, FeePreset, FileStore, OutputDestination, RawTransactionEditor, ScanProgress,
    SelectionPolicy, SendAmount, Wallet, WordCount,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, parse_network};

/// Satchel non-custodial wallet.
#[derive(Parser)]
#[command(name = "satchel")]
#[command(version, about = "Native segwit HD wallet over a block explorer.")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every command. Each overrides its `SATCHEL_*` variable.
#[derive(Args)]
struct GlobalArgs {
    /// Path to wallet file (default: ~/.satchel/wallet.dat).
    #[arg(short, long, global = true)]
    file: Option<PathBuf>,

    /// Network: mainnet, testnet, signet or regtest.
    #[arg(short, long, global = true)]
    network: Option<String>,

    /// Esplora API root, e.g. https://blockstream.info/testnet/api.
    #[arg(long, global = true)]
    explorer: Option<String>,

    /// Consecutive unused addresses scanned before discovery stops.
    #[arg(long, global = true)]
    gap_limit: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Wallet management subcommands.
    Wallet {
        #[command(subcommand)]
        action: WalletAction,
    },
    /// Show a receive address.
    Address(AddressArgs),
    /// Scan the chain for used addresses.
    Discover,
    /// Query wallet balance from the explorer.
    Balance(BalanceArgs),
    /// Show the explorer's fee-rate presets.
    Fees,
    /// Build, sign and optionally broadcast a payment.
    Send(SendArgs),
    /// Inspect or edit a raw transaction.
    Raw {
        #[command(subcommand)]
        action: RawAction,
    },
}

#[derive(Subcommand)]
enum WalletAction {
    /// Create a new HD wallet.
    Create(WalletCreateArgs),
    /// Restore a wallet from a mnemonic.
    Restore(WalletRestoreArgs),
}

#[derive(Args)]
struct WalletCreateArgs {
    /// Mnemonic length: 12 or 24 words.
    #[arg(short, long, default_value_t = 12)]
    words: usize,

    /// Prompt for an optional BIP-39 passphrase.
    #[arg(long)]
    passphrase: bool,
}

#[derive(Args)]
struct WalletRestoreArgs {
    /// Mnemonic phrase. If not provided, will prompt securely.
    #[arg(short, long)]
    mnemonic: Option<String>,

    /// Prompt for the BIP-39 passphrase used at creation.
    #[arg(long)]
    passphrase: bool,
}

#[derive(Args)]
struct AddressArgs {
    /// Hand out a fresh address and advance past it.
    #[arg(long)]
    new: bool,

    /// Skip discovery and use only locally known state.
    #[arg(long)]
    offline: bool,
}

#[derive(Args)]
struct BalanceArgs {
    /// List every unspent output.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args)]
struct SendArgs {
    /// Recipient address.
    #[arg(short, long)]
    to: String,

    /// Amount in satoshis.
    #[arg(short, long, required_unless_present = "max", conflicts_with = "max")]
    amount: Option<u64>,

    /// Send everything selected, less the fee.
    #[arg(long)]
    max: bool,

    /// Fee rate in sat/vB, e.g. 4.5.
    #[arg(long, conflicts_with = "preset")]
    fee_rate: Option<FeeRate>,

    /// Fee preset: economy, medium or fast.
    #[arg(long, default_value = "medium")]
    preset: FeePreset,

    /// Spend exactly these outputs (txid:vout). Repeatable.
    #[arg(long = "utxo")]
    utxos: Vec<OutPoint>,

    /// Allow unconfirmed outputs when selecting automatically.
    #[arg(long)]
    include_unconfirmed: bool,

    /// Relay the signed transaction. Without this the hex is printed.
    #[arg(long)]
    broadcast: bool,
}

#[derive(Subcommand)]
enum RawAction {
    /// Decode a hex transaction.
    Decode(RawDecodeArgs),
    /// Re-price a hex transaction around a new first-output value.
    Edit(RawEditArgs),
}

#[derive(Args)]
struct RawDecodeArgs {
    /// Hex-encoded transaction.
    hex: String,
}

#[derive(Args)]
struct RawEditArgs {
    /// Hex-encoded transaction.
    hex: String,

    /// New value of the first output, in satoshis.
    #[arg(short, long)]
    amount: u64,

    /// Fee rate in sat/vB.
    #[arg(long)]
    fee_rate: FeeRate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = resolve_config(cli.global)?;

    match cli.command {
        Commands::Wallet { action } => match action {
            WalletAction::Create(args) => wallet_create(&config, args),
            WalletAction::Restore(args) => wallet_restore(&config, args),
        },
        Commands::Address(args) => wallet_address(&config, args).await,
        Commands::Discover => wallet_discover(&config).await,
        Commands::Balance(args) => wallet_balance(&config, args).await,
        Commands::Fees => show_fees(&config).await,
        Commands::Send(args) => wallet_send(&config, args).await,
        Commands::Raw { action } => match action {
            RawAction::Decode(args) => raw_decode(&config, args),
            RawAction::Edit(args) => raw_edit(&config, args),
        },
    }
}

/// Environment first, then command-line overrides.
fn resolve_config(global: GlobalArgs) -> Result<Config> {
    let mut config = Config::from_env()?;
    if let Some(path) = global.file {
        config.wallet_path = path;
    }
    if let Some(name) = global.network {
        config.network = parse_network(&name)?;
    }
    if let Some(url) = global.explorer {
        config.explorer_url = Some(url);
    }
    if let Some(gap) = global.gap_limit {
        if gap == 0 {
            bail!("--gap-limit must be at least 1");
        }
        config.gap_limit = gap;
    }
    tracing::debug!(
        wallet = %config.wallet_path.display(),
        network = %config.network,
        "configuration resolved"
    );
    Ok(config)
}

/// Create a new wallet with a random mnemonic.
fn wallet_create(config: &Config, args: WalletCreateArgs) -> Result<()> {
    if config.wallet_path.exists() {
        bail!("Wallet file already exists: {}", config.wallet_path.display());
    }
    let words = WordCount::try_from(args.words)?;
    let passphrase = if args.passphrase {
        prompt_password("BIP-39 passphrase")?
    } else {
        String::new()
    };
    let password = new_password(config)?;

    let mut wallet = Wallet::create(config.wallet_config(), words, &passphrase)?;
    let first = wallet.receive_address()?;

    println!("\n=== WALLET CREATED ===");
    println!("Network: {}", network_name(wallet.network()));
    println!("Path: {}", wallet.keychain().path_template());
    println!("\nMNEMONIC (BACKUP THIS, {} WORDS):", words.words());
    println!("  {}", wallet.mnemonic());
    println!("\nWARNING: This mnemonic will NOT be shown again.");
    println!("Store it in a secure location. Anyone with it can spend your funds.");
    println!("\nFirst receive address: {first}");

    let store = FileStore::new(&config.wallet_path, password.as_bytes());
    wallet.save(&store).context("Failed to save wallet")?;
    println!("Wallet saved to: {}", config.wallet_path.display());
    Ok(())
}

/// Restore a wallet from a mnemonic.
fn wallet_restore(config: &Config, args: WalletRestoreArgs) -> Result<()> {
    if config.wallet_path.exists() {
        bail!("Wallet file already exists: {}", config.wallet_path.display());
    }
    let phrase = match args.mnemonic {
        Some(m) => m,
        None => prompt_password("Enter mnemonic")?,
    };
    let passphrase = if args.passphrase {
        prompt_password("BIP-39 passphrase")?
    } else {
        String::new()
    };

    let wallet = Wallet::restore(config.wallet_config(), &phrase, &passphrase)
        .context("Invalid mnemonic")?;
    let password = new_password(config)?;

    let store = FileStore::new(&config.wallet_path, password.as_bytes());
    wallet.save(&store).context("Failed to save wallet")?;

    println!("\n=== WALLET RESTORED ===");
    println!("Network: {}", network_name(wallet.network()));
    println!("Wallet saved to: {}", config.wallet_path.display());
    println!("Run `satchel discover` to find previously used addresses.");
    Ok(())
}

/// Display a receive address.
async fn wallet_address(config: &Config, args: AddressArgs) -> Result<()> {
    let (mut wallet, store) = open_wallet(config)?;
    if !args.offline {
        let client = explorer(config)?;
        wallet
            .discover(&client, &CancellationToken::new(), None)
            .await?;
    }

    let address = if args.new {
        let address = wallet.next_receive_address()?;
        wallet.save(&store).context("Failed to save wallet")?;
        address
    } else {
        wallet.receive_address()?
    };
    println!("{address}");
    Ok(())
}

/// Gap-limit scan with live progress. Ctrl-C stops the scan early.
async fn wallet_discover(config: &Config) -> Result<()> {
    let (mut wallet, store) = open_wallet(config)?;
    let client = explorer(config)?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<ScanProgress>();
    let printer = tokio::spawn(async move {
        while let Some(step) = progress_rx.recv().await {
            println!("{}", progress_line(&step));
        }
    });

    println!("Scanning {} ...", wallet.keychain().path_template());
    let outcome = wallet.discover(&client, &cancel, Some(&progress_tx)).await?;
    drop(progress_tx);
    printer.await.context("Progress printer failed")?;

    if !outcome.completed {
        println!("\nScan cancelled after {} addresses.", outcome.scanned);
    }
    match outcome.highest_used {
        Some(i) => println!("\nHighest used index: {i}"),
        None => println!("\nNo used addresses found."),
    }
    if outcome.failed_lookups > 0 {
        println!(
            "WARNING: {} lookups failed and were treated as unused.",
            outcome.failed_lookups
        );
    }
    println!("Addresses tracked: {}", wallet.addresses().len());
    println!("Next receive address: {}", wallet.receive_address()?);

    wallet.save(&store).context("Failed to save wallet")?;
    Ok(())
}

/// Query and display the wallet balance.
async fn wallet_balance(config: &Config, args: BalanceArgs) -> Result<()> {
    let (mut wallet, _store) = open_wallet(config)?;
    let client = explorer(config)?;

    wallet
        .discover(&client, &CancellationToken::new(), None)
        .await?;
    let snapshot = wallet.refresh(&client).await;
    let balance = wallet.balance();

    println!("Confirmed:   {}", format_sats(balance.confirmed));
    println!("Unconfirmed: {}", format_sats(balance.unconfirmed));
    println!("Total:       {}", format_sats(balance.total()));
    println!("UTXOs:       {}", balance.utxo_count);

    if args.verbose {
        for utxo in snapshot.utxos() {
            let state = if utxo.confirmed { "" } else { " (unconfirmed)" };
            println!(
                "  {} {:>12} sats  {}{}",
                utxo.outpoint, utxo.value, utxo.address, state
            );
        }
    }
    if !snapshot.failed_addresses().is_empty() {
        println!(
            "\nWARNING: {} addresses could not be queried; balance may be incomplete.",
            snapshot.failed_addresses().len()
        );
    }
    Ok(())
}

/// Print the explorer's fee-rate presets.
async fn show_fees(config: &Config) -> Result<()> {
    let client = explorer(config)?;
    let presets = client
        .fee_presets()
        .await
        .context("Failed to fetch fee estimates")?;
    for preset in [FeePreset::Economy, FeePreset::Medium, FeePreset::Fast] {
        let rate = preset.resolve(&presets);
        println!(
            "{:<8} {:>12}   ~{} sats for 1-in/2-out",
            preset.to_string(),
            rate.to_string(),
            FeeEstimator::fee_for(rate, 1, 2)
        );
    }
    Ok(())
}

/// Plan, sign and optionally broadcast a payment.
async fn wallet_send(config: &Config, args: SendArgs) -> Result<()> {
    let (mut wallet, store) = open_wallet(config)?;
    let client = explorer(config)?;

    let recipient = wallet.parse_address(&args.to)?;
    let amount = match args.amount {
        Some(sats) => SendAmount::Exact(sats),
        None => SendAmount::Max,
    };
    let policy = if !args.utxos.is_empty() {
        Some(SelectionPolicy::Explicit(args.utxos))
    } else if args.include_unconfirmed {
        Some(SelectionPolicy::All)
    } else {
        None
    };

    wallet
        .discover(&client, &CancellationToken::new(), None)
        .await?;
    let snapshot = wallet.refresh(&client).await;
    if !snapshot.failed_addresses().is_empty() {
        println!(
            "WARNING: {} addresses could not be queried; their outputs are excluded.",
            snapshot.failed_addresses().len()
        );
    }

    let fee_rate = match args.fee_rate {
        Some(rate) => rate,
        None => wallet.preset_fee_rate(&client, args.preset).await?,
    };

    let plan = wallet.plan_send(recipient, amount, fee_rate, policy)?;
    let tx = wallet.build_transaction(&plan)?;
    // The change address was reserved; persist before anything leaves.
    wallet.save(&store).context("Failed to save wallet")?;

    println!("\n=== TRANSACTION SIGNED ===");
    println!("TxID: {}", tx.txid());
    println!("To: {}", plan.recipient);
    println!("Amount: {}", format_sats(tx.amount()));
    println!("Fee: {} sats ({fee_rate}, {} vB)", tx.fee(), tx.vsize());
    if tx.change() > 0 {
        println!("Change: {}", format_sats(tx.change()));
    }
    println!("Inputs: {}", tx.spent_outpoints().len());

    if args.broadcast {
        let txid = wallet.broadcast(&tx, &client).await?;
        println!("\n=== TRANSACTION SENT ===");
        println!("TxID: {txid}");
    } else {
        println!("\nRaw transaction (not broadcast):");
        println!("{}", tx.to_hex());
    }
    Ok(())
}

/// Decode a raw transaction.
fn raw_decode(config: &Config, args: RawDecodeArgs) -> Result<()> {
    let editor = RawTransactionEditor::decode(&args.hex, config.network)?;
    let decoded = editor.decode_outputs();

    println!("TxID: {}", decoded.txid);
    println!("Version: {}", decoded.version);
    println!("Lock time: {}", decoded.lock_time);
    println!("Virtual size: {} vB", decoded.vsize);
    println!("RBF: {}", if decoded.signals_rbf() { "yes" } else { "no" });
    println!("\nInputs:");
    for input in &decoded.inputs {
        let signed = if input.has_witness { "signed" } else { "unsigned" };
        println!(
            "  {}  seq={:#010x}  {}",
            input.previous_output, input.sequence, signed
        );
    }
    println!("\nOutputs:");
    for output in &decoded.outputs {
        let dest = match &output.destination {
            OutputDestination::Address(a) => a.to_string(),
            OutputDestination::Unparseable(script) => format!("script {}", script.to_hex_string()),
        };
        println!("  #{} {:>12} sats  {}", output.index, output.value, dest);
    }
    println!("\nTotal output: {}", format_sats(decoded.total_output));
    Ok(())
}

/// Re-price a raw transaction around a new first-output value.
fn raw_edit(config: &Config, args: RawEditArgs) -> Result<()> {
    let editor = RawTransactionEditor::decode(&args.hex, config.network)?;
    let edited = editor.edit(args.amount, args.fee_rate)?;

    println!("Fee: {} sats", edited.fee);
    if edited.change > 0 {
        println!("Change: {}", format_sats(edited.change));
    } else {
        println!("Change output dropped.");
    }
    println!("\nWARNING: input signatures no longer match and must be re-signed.");
    println!("{}", edited.to_hex());
    Ok(())
}

/// Load the wallet file, prompting for its password.
fn open_wallet(config: &Config) -> Result<(Wallet, FileStore)> {
    if !config.wallet_path.exists() {
        bail!(
            "No wallet at {} (run `satchel wallet create`)",
            config.wallet_path.display()
        );
    }
    let password = match &config.password {
        Some(p) => p.clone(),
        None => prompt_password("Wallet password")?,
    };
    let store = FileStore::new(&config.wallet_path, password.as_bytes());
    let wallet = Wallet::load(&store, config.wallet_config())
        .context("Failed to load wallet (check password)")?
        .context("Wallet file is empty")?;
    Ok((wallet, store))
}

fn explorer(config: &Config) -> Result<EsploraClient> {
    EsploraClient::new(&config.explorer_config()).context("Failed to create explorer client")
}

/// Prompt for a new password twice, unless one is configured.
fn new_password(config: &Config) -> Result<String> {
    if let Some(p) = &config.password {
        return Ok(p.clone());
    }
    let password = prompt_password("Enter wallet password")?;
    let password_confirm = prompt_password("Confirm password")?;
    if password != password_confirm {
        bail!("Passwords do not match");
    }
    Ok(password)
}

/// Prompt for a password securely (no echo).
fn prompt_password(prompt: &str) -> Result<String> {
    rpassword::prompt_password(format!("{}: ", prompt)).context("Failed to read password")
}

/// Human-readable network name.
fn network_name(network: Network) -> &'static str {
    match network {
        Network::Bitcoin => "Mainnet",
        Network::Testnet => "Testnet",
        Network::Signet => "Signet",
        Network::Regtest => "Regtest",
        _ => "Unknown",
    }
}

fn progress_line(step: &ScanProgress) -> String {
    let status = if step.lookup_failed {
        "lookup failed"
    } else if step.active {
        "used"
    } else {
        "unused"
    };
    format!("  #{:<4} {}  {}", step.index, step.address, status)
}

fn format_sats(sats: u64) -> String {
    format!("{}.{:08} BTC ({sats} sats)", sats / COIN, sats % COIN)
}

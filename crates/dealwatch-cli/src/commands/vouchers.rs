use clap::Subcommand;
use dealwatch_core::{open_tracking_store, EngineConfig};

#[derive(Subcommand)]
pub enum VouchersAction {
    /// List voucher claims persisted for tracking
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget all persisted voucher claims
    Clear,
}

pub fn run(action: VouchersAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::load()?;
    let store = open_tracking_store(&config)?;

    match action {
        VouchersAction::List { json } => {
            let claims = store.load();
            if json {
                println!("{}", serde_json::to_string_pretty(&claims)?);
            } else if claims.is_empty() {
                println!("no tracked vouchers");
            } else {
                for claim in &claims {
                    let checked = claim
                        .last_checked
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".into());
                    println!(
                        "#{} store={} promotion={} status={:?} last_checked={}",
                        claim.redemption_id,
                        claim.store_id,
                        claim.promotion_id,
                        claim.status,
                        checked
                    );
                }
            }
        }
        VouchersAction::Clear => {
            store.clear()?;
            println!("cleared tracked vouchers");
        }
    }
    Ok(())
}

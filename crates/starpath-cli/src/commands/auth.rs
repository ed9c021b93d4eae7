use clap::Subcommand;
use starpath_core::reward::{keyring_store, API_KEY_NAME};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Store the reward-service API token in the OS keyring
    SetKey { token: String },
    /// Report whether a token is stored
    Status,
    /// Remove the stored token
    Clear,
}

pub fn run(action: AuthAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        AuthAction::SetKey { token } => {
            keyring_store::set(API_KEY_NAME, &token)?;
            println!("Reward-service token stored.");
        }
        AuthAction::Status => {
            let present = keyring_store::get(API_KEY_NAME)?.is_some();
            println!(
                "Reward-service token: {}",
                if present { "configured" } else { "not configured" }
            );
        }
        AuthAction::Clear => {
            keyring_store::delete(API_KEY_NAME)?;
            println!("Reward-service token removed.");
        }
    }
    Ok(())
}

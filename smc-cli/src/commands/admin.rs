use anyhow::{anyhow, Result};
use clap::Subcommand;
use smc_client::elements::{search, user, AdminUser};
use smc_client::rest::SmcClient;
use smc_client::SessionContext;

#[derive(Subcommand)]
pub enum AdminCommands {
    /// Create an administrator account
    Create {
        /// Account name
        name: String,

        /// Unrestricted administrator on the SMC
        #[arg(long)]
        superuser: bool,

        /// Local admin on the target engines
        #[arg(long)]
        local_admin: bool,

        /// Allow sudo on the target engines
        #[arg(long)]
        allow_sudo: bool,

        /// Engines (by name) the account may log into locally
        #[arg(long)]
        engine: Vec<String>,
    },

    /// Change an account password
    ChangePassword {
        /// Account name
        name: String,
        /// New password
        password: String,
    },

    /// Toggle an account between enabled and disabled
    EnableDisable {
        /// Account name
        name: String,
    },
}

pub async fn execute(session: &SessionContext, command: AdminCommands) -> Result<()> {
    let client = SmcClient::new(session.clone());

    match command {
        AdminCommands::Create {
            name,
            superuser,
            local_admin,
            allow_sudo,
            engine,
        } => {
            let mut targets = Vec::new();
            for engine_name in &engine {
                let href = search::element_href(&client, engine_name)
                    .await?
                    .ok_or_else(|| anyhow!("No engine named {engine_name}"))?;
                targets.push(href);
            }

            let href = AdminUser::new(name)
                .with_superuser(superuser)
                .with_local_admin(local_admin)
                .with_allow_sudo(allow_sudo)
                .with_engine_targets(targets)
                .create(&client)
                .await?;
            println!("Created: {href}");
        }
        AdminCommands::ChangePassword { name, password } => {
            user::change_password(&client, &name, &password).await?;
            println!("Password changed for {name}");
        }
        AdminCommands::EnableDisable { name } => {
            user::enable_disable(&client, &name).await?;
            println!("Toggled enabled state of {name}");
        }
    }

    Ok(())
}

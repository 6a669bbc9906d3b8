use crate::cli::InventoryCommand;
use crate::error::Result;
use crate::storage::SqliteStorage;
use colored::Colorize;
use prettytable::{format, row, Table};

/// Handle inventory commands
pub fn handle_inventory(storage: &SqliteStorage, command: InventoryCommand) -> Result<()> {
    match command {
        InventoryCommand::Grant {
            user,
            item,
            quantity,
        } => {
            storage.grant_item(user, item, quantity)?;
            println!(
                "{}",
                format!(
                    "Granted {} x item {} to user {} (now {})",
                    quantity,
                    item,
                    user,
                    storage.item_quantity(user, item)?
                )
                .green()
            );
        }
        InventoryCommand::Show { user } => {
            let entries = storage.inventory(user)?;
            if entries.is_empty() {
                println!("{}", format!("User {} has no items.", user).yellow());
                return Ok(());
            }

            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
            table.add_row(row!["Item".bold(), "Name".bold(), "Quantity".bold()]);
            for entry in entries {
                table.add_row(row![
                    entry.item_id.to_string().cyan(),
                    entry.name,
                    entry.quantity
                ]);
            }

            println!("\nInventory of user {}:", user);
            table.printstd();
            println!();
        }
    }
    Ok(())
}

use crate::cli::ItemCommand;
use crate::error::Result;
use crate::storage::{ItemInfo, SqliteStorage};
use colored::Colorize;
use prettytable::{format, row, Table};

/// Handle item catalog commands
pub fn handle_items(storage: &SqliteStorage, command: ItemCommand) -> Result<()> {
    match command {
        ItemCommand::Add { name, untradeable } => {
            let id = storage.create_item(&name, !untradeable)?;
            println!("{}", format!("Created item {} with id {}", name, id).green());
        }
        ItemCommand::List => {
            let items = storage.list_items()?;
            if items.is_empty() {
                println!("{}", "No items in the catalog.".yellow());
                return Ok(());
            }
            println!("\nItem catalog:");
            items_table(&items).printstd();
            println!();
        }
    }
    Ok(())
}

fn items_table(items: &[ItemInfo]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row!["ID".bold(), "Name".bold(), "Tradeable".bold()]);

    for item in items {
        let tradeable = if item.tradeable {
            "yes".green()
        } else {
            "no".red()
        };
        table.add_row(row![item.id.to_string().cyan(), item.name, tradeable]);
    }
    table
}

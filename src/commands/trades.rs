use crate::cli::TradeCommand;
use crate::error::{Result, TradepostError};
use crate::storage::{SqliteStorage, TradeRecord, TradeSide};
use colored::Colorize;
use prettytable::{format, row, Table};

/// Handle trade history commands
pub fn handle_trades(storage: &SqliteStorage, command: TradeCommand) -> Result<()> {
    match command {
        TradeCommand::List { user, limit, json } => {
            let trades = storage.list_trades(user, limit)?;

            if json {
                let out = serde_json::to_string_pretty(&trades)
                    .map_err(TradepostError::Serialization)?;
                println!("{}", out);
                return Ok(());
            }

            if trades.is_empty() {
                println!("{}", "No completed trades found.".yellow());
                return Ok(());
            }

            println!("\nCompleted trades:");
            trades_table(&trades).printstd();
            println!();
        }
    }
    Ok(())
}

fn trades_table(trades: &[TradeRecord]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row![
        "ID".bold(),
        "Sender".bold(),
        "Receiver".bold(),
        "Sent".bold(),
        "Received".bold(),
        "Live".bold(),
        "Completed At".bold()
    ]);

    for trade in trades {
        let live = if trade.is_live_trade { "yes" } else { "no" };
        table.add_row(row![
            trade.id.to_string().cyan(),
            trade.sender_id,
            trade.receiver_id,
            describe_side(trade, TradeSide::Sender),
            describe_side(trade, TradeSide::Receiver),
            live,
            trade.created_at.format("%Y-%m-%d %H:%M")
        ]);
    }
    table
}

/// "3x#4, 1x#9" for the lines given up by `side`
fn describe_side(trade: &TradeRecord, side: TradeSide) -> String {
    let lines: Vec<String> = trade
        .lines
        .iter()
        .filter(|l| l.side == side)
        .map(|l| format!("{}x#{}", l.quantity, l.item_id))
        .collect();
    if lines.is_empty() {
        "-".to_string()
    } else {
        lines.join(", ")
    }
}

use billio_client::config::CONFIG;
use billio_client::core::models::expense::ExpenseDraft;
use billio_client::core::models::group::GroupId;
use billio_client::core::models::user::UserProfile;
use billio_client::{
    BillioClient, BillioError, FieldError, FileSessionStore, GroupSnapshot, HttpApi, InMemoryCache, InMemoryLogging, Money,
    SplitMethod,
};
use std::{env, process};
use tracing::info;
use tracing_subscriber::EnvFilter;

type Client = BillioClient<HttpApi, FileSessionStore, InMemoryLogging, InMemoryCache>;

const USAGE: &str = "Usage: billio <command>

Commands:
  login <username> <password>
  logout
  whoami
  groups
  balances <group_id>
  add-expense <group_id> <title> <amount> [equal]";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&CONFIG.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(env::args().skip(1).collect()).await {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

async fn run(args: Vec<String>) -> Result<(), BillioError> {
    info!("Using {:?}", *CONFIG);
    let client: Client = BillioClient::new(
        HttpApi::new(&CONFIG)?,
        FileSessionStore::new(&CONFIG.session_path),
        InMemoryLogging::new(),
        InMemoryCache::new(),
        &CONFIG,
    );

    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args.as_slice() {
        ["login", username, password] => {
            let user = client.login(username, password).await?;
            println!("Logged in as {}", user.display_name());
        }
        ["logout"] => {
            client.restore_session().await?;
            client.logout().await?;
            println!("Logged out");
        }
        ["whoami"] => match client.restore_session().await? {
            Some(user) => print_user(&user),
            None => println!("Not logged in"),
        },
        ["groups"] => {
            require_session(&client).await?;
            for group in client.list_groups().await? {
                println!("{:>6}  {} ({} members)", group.id, group.name, group.members().len());
            }
        }
        ["balances", group_id] => {
            require_session(&client).await?;
            let snapshot = client.refresh_group(parse_group_id(group_id)?).await?;
            print_snapshot(&snapshot);
        }
        ["add-expense", group_id, title, amount, rest @ ..] if rest.is_empty() || rest == ["equal"] => {
            let user = require_session(&client).await?;
            let snapshot = client.refresh_group(parse_group_id(group_id)?).await?;
            let total = Money::from_decimal_str(amount, CONFIG.currency)?;
            let draft = ExpenseDraft::paid_by(
                snapshot.group.id,
                *title,
                total,
                user.to_participant(),
                snapshot.group.members().to_vec(),
                SplitMethod::Equal,
            );
            let expense = client.submit_expense(draft).await?;
            println!("Added expense {} ({})", expense.id, expense.total);
            print_snapshot(&client.refresh_group(snapshot.group.id).await?);
        }
        _ => {
            eprintln!("{USAGE}");
            process::exit(2);
        }
    }
    Ok(())
}

async fn require_session(client: &Client) -> Result<UserProfile, BillioError> {
    client.restore_session().await?.ok_or(BillioError::NotAuthenticated)
}

fn parse_group_id(raw: &str) -> Result<GroupId, BillioError> {
    raw.parse().map(GroupId).map_err(|_| {
        BillioError::InvalidInput(
            "group".to_string(),
            FieldError::new("group", "Invalid group", format!("`{raw}` is not a group id")),
        )
    })
}

fn print_user(user: &UserProfile) {
    println!("{} <{}> (#{})", user.display_name(), user.email, user.id);
}

fn print_snapshot(snapshot: &GroupSnapshot) {
    let name = |id| {
        snapshot
            .group
            .member(id)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| format!("user {id}"))
    };
    if snapshot.stale {
        println!("(offline, showing data from {})", snapshot.fetched_at.format("%Y-%m-%d %H:%M"));
    }
    println!("{}: {} expenses", snapshot.group.name, snapshot.expenses.len());
    if snapshot.balances.is_empty() {
        println!("  all settled up");
    }
    for balance in &snapshot.balances {
        println!("  {} owes {} {}", name(balance.user_id), name(balance.owes_to), balance.amount);
    }
    if snapshot.settlements.len() < snapshot.balances.len() {
        println!("Suggested settlements:");
        for transfer in &snapshot.settlements {
            println!("  {} pays {} {}", name(transfer.user_id), name(transfer.owes_to), transfer.amount);
        }
    }
}

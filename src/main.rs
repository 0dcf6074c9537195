//! e-med 命令行客户端
//!
//! 日志级别由 `RUST_LOG` 控制，默认 `emed_client=info`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use emed_client::api::PrescriptionUpload;
use emed_client::order_status::{self, OrderAction};
use emed_client::routes::{self, Access, Route};
use emed_client::types::{LoginCredentials, Order, RegisterData, VerificationDecision};
use emed_client::views::ViewState;
use emed_client::views::admin::{AdminOrdersView, PrescriptionReview, ReviewForm};
use emed_client::views::catalog::CatalogView;
use emed_client::views::checkout::{self, CheckoutForm};
use emed_client::views::deliveries::MyDeliveriesView;
use emed_client::views::notifications::{self, Notification, NotificationSink};
use emed_client::views::order_detail::OrderDetailView;
use emed_client::views::orders::OrdersView;
use emed_client::views::prescriptions::PrescriptionsView;
use emed_client::{ClientConfig, PharmacyClient};

#[derive(Parser)]
#[command(name = "emed", about = "e-med pharmacy client", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        remember: bool,
    },
    Register(RegisterArgs),
    Logout,
    Whoami,
    /// 浏览药品目录
    Medicines(MedicineArgs),
    #[command(subcommand)]
    Cart(CartCommands),
    Checkout(CheckoutArgs),
    /// 我的订单
    Orders,
    /// 订单详情
    Order {
        id: i64,
        /// 持续刷新，直到 Ctrl-C
        #[arg(long)]
        watch: bool,
        #[arg(long)]
        cancel: bool,
        /// 上传配送凭证
        #[arg(long)]
        proof: Option<PathBuf>,
    },
    #[command(subcommand)]
    Prescriptions(PrescriptionCommands),
    #[command(subcommand)]
    Admin(AdminCommands),
    /// 指派给我的配送单
    Deliveries,
    ShareLocation {
        order_id: i64,
        lat: f64,
        lng: f64,
    },
    /// 打印订单状态通知，直到 Ctrl-C
    Watch,
}

#[derive(Args)]
struct RegisterArgs {
    #[arg(long)]
    email: String,
    #[arg(long)]
    phone: String,
    #[arg(long)]
    password: String,
    #[arg(long)]
    full_name: String,
    #[arg(long)]
    address: Option<String>,
}

#[derive(Args)]
struct MedicineArgs {
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    category: Option<i64>,
    #[arg(long)]
    min_price: Option<f64>,
    #[arg(long)]
    max_price: Option<f64>,
    /// 只看处方药
    #[arg(long)]
    rx: bool,
    #[arg(long)]
    in_stock: bool,
}

#[derive(Subcommand)]
enum CartCommands {
    List,
    Add {
        medicine_id: i64,
        #[arg(default_value_t = 1)]
        quantity: u32,
    },
    Set { medicine_id: i64, quantity: i64 },
    Remove { medicine_id: i64 },
    Clear,
}

#[derive(Args)]
struct CheckoutArgs {
    /// 默认使用个人资料中的地址
    #[arg(long)]
    address: Option<String>,
    #[arg(long, default_value = "")]
    instructions: String,
    /// 提供原因即为加急订单
    #[arg(long)]
    emergency: Option<String>,
}

#[derive(Subcommand)]
enum PrescriptionCommands {
    List,
    Upload {
        file: PathBuf,
        #[arg(long)]
        doctor: Option<String>,
        #[arg(long)]
        hospital: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        expiry: Option<String>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    Orders,
    Advance {
        order_id: i64,
        action: ActionArg,
        #[arg(long)]
        notes: Option<String>,
    },
    Assign { order_id: i64, partner_id: i64 },
    Prescriptions,
    Verify {
        prescription_id: i64,
        decision: DecisionArg,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(long, default_value = "")]
        medicines: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ActionArg {
    Accept,
    Decline,
    Preparing,
    OutForDelivery,
    Delivered,
}

impl From<ActionArg> for OrderAction {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::Accept => OrderAction::Accept,
            ActionArg::Decline => OrderAction::Decline,
            ActionArg::Preparing => OrderAction::MarkPreparing,
            ActionArg::OutForDelivery => OrderAction::MarkOutForDelivery,
            ActionArg::Delivered => OrderAction::MarkDelivered,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DecisionArg {
    Verified,
    Rejected,
}

struct StdoutSink;

impl NotificationSink for StdoutSink {
    fn notify(&self, notification: &Notification) {
        println!("[{}] {}", notification.title, notification.body);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("emed_client=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::load().context("failed to load configuration")?;
    let client = PharmacyClient::bootstrap(config).await?;

    let result = run(&client, cli.command).await;
    client.shutdown();
    result
}

async fn run(client: &PharmacyClient, command: Commands) -> Result<()> {
    match command {
        Commands::Login { email, password, remember } => {
            let user = client
                .auth()
                .login(&LoginCredentials { email, password }, remember)
                .await?;
            println!("Logged in as {} ({})", user.full_name, user.role.as_str());
            return Ok(());
        }
        Commands::Register(args) => {
            let data = RegisterData {
                email: args.email,
                phone: args.phone,
                password: args.password,
                full_name: args.full_name,
                address: args.address,
                ..Default::default()
            };
            let user = client.auth().register(&data).await?;
            println!("Registered {} (id {})", user.email, user.id);
            return Ok(());
        }
        Commands::Logout => {
            client.logout();
            println!("Logged out");
            return Ok(());
        }
        _ => {}
    }

    if client.restore().await.is_none() {
        bail!("not logged in, run `emed login` first");
    }
    require(client, route_for(&command))?;

    match command {
        Commands::Whoami => {
            if let Some(user) = client.current_user() {
                println!("{} <{}> role={} id={}", user.full_name, user.email, user.role.as_str(), user.id);
                let links: Vec<_> = routes::nav_links(Some(&user)).iter().map(|l| l.label).collect();
                println!("Pages: {}", links.join(", "));
            }
        }
        Commands::Medicines(args) => {
            let mut view = CatalogView::new(client.api().clone(), client.cart().clone());
            view.filters.search = args.search.unwrap_or_default();
            view.filters.category_id = args.category;
            view.filters.min_price = args.min_price;
            view.filters.max_price = args.max_price;
            view.filters.prescription_required = args.rx.then_some(true);
            view.filters.in_stock_only = args.in_stock;
            view.load().await;
            if let Some(error) = view.state().error() {
                bail!("{}", error);
            }
            for medicine in view.visible() {
                let rx = if medicine.prescription_required { " [Rx]" } else { "" };
                println!(
                    "#{:<5} {:<32} {:>8.2}  stock {}{}",
                    medicine.id, medicine.name, medicine.price, medicine.stock_quantity, rx
                );
            }
        }
        Commands::Cart(command) => cart_command(client, command).await?,
        Commands::Checkout(args) => {
            let mut form = CheckoutForm::for_user(client.current_user().as_ref());
            if let Some(address) = args.address {
                form.delivery_address = address;
            }
            form.delivery_instructions = args.instructions;
            if let Some(reason) = args.emergency {
                form.is_emergency = true;
                form.emergency_reason = reason;
            }
            let fees = form.fees(client.cart());
            let seed = checkout::submit(client.api(), client.cart(), &form).await?;
            println!(
                "Order {} placed: subtotal {:.2} + delivery {:.2} + emergency {:.2} = {:.2}",
                seed.order_number, fees.subtotal, fees.delivery_fee, fees.emergency_fee, seed.total
            );
        }
        Commands::Orders => {
            let mut view = OrdersView::new(client.api().clone(), Some(client.cache().clone()));
            view.load().await;
            print_orders(view.state())?;
        }
        Commands::Order { id, watch, cancel, proof } => {
            let mut view = OrderDetailView::new(client.api().clone(), Some(client.cache().clone()), id, None);
            view.load().await;
            if cancel {
                if !view.can_cancel() {
                    bail!("only pending orders can be cancelled");
                }
                view.cancel().await?;
            }
            if let Some(file) = proof {
                let receipt = view.upload_proof(&file).await?;
                println!("{}", receipt.message);
            }
            print_order_detail(&view)?;

            if watch {
                client.bridge().enable().await?;
                let mut messages = client.bridge().subscribe();
                loop {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => break,
                        changed = messages.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                    let Some(message) = messages.borrow_and_update().clone() else {
                        continue;
                    };
                    if view.handle_message(&message).await {
                        print_order_detail(&view)?;
                    }
                }
            }
        }
        Commands::Prescriptions(command) => {
            let mut view = PrescriptionsView::new(client.api().clone());
            match command {
                PrescriptionCommands::List => view.load().await,
                PrescriptionCommands::Upload { file, doctor, hospital, date, expiry } => {
                    let info = PrescriptionUpload {
                        doctor_name: doctor,
                        hospital_name: hospital,
                        prescription_date: date,
                        expiry_date: expiry,
                    };
                    let prescription = view.upload(&file, &info).await?;
                    println!("Uploaded prescription #{}, awaiting verification", prescription.id);
                }
            }
            match view.state() {
                ViewState::Ready(list) => {
                    for p in list {
                        println!(
                            "#{:<5} {:<10} {}",
                            p.id,
                            p.status.as_str(),
                            p.doctor_name.as_deref().unwrap_or("-")
                        );
                    }
                }
                ViewState::Failed(error) => bail!("{}", error),
                ViewState::Loading => {}
            }
        }
        Commands::Admin(command) => admin_command(client, command).await?,
        Commands::Deliveries => {
            let Some(me) = client.current_user() else {
                bail!("not logged in");
            };
            let mut view = MyDeliveriesView::new(client.api().clone(), client.bridge().clone(), me.id);
            if let Err(e) = view.load().await {
                eprintln!("realtime unavailable: {}", e);
            }
            print_orders(view.state())?;
        }
        Commands::ShareLocation { order_id, lat, lng } => {
            let Some(me) = client.current_user() else {
                bail!("not logged in");
            };
            client.bridge().enable().await?;
            let view = MyDeliveriesView::new(client.api().clone(), client.bridge().clone(), me.id);
            if !view.share_location(order_id, lat, lng) {
                bail!("realtime connection unavailable");
            }
            // 给发送任务留出写出时间
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            println!("Location shared for order #{}", order_id);
        }
        Commands::Watch => {
            client.bridge().enable().await?;
            let cancel = CancellationToken::new();
            let task = tokio::spawn(notifications::run_notifier(
                client.bridge().clone(),
                client.session().clone(),
                Arc::new(StdoutSink),
                cancel.clone(),
            ));
            tokio::signal::ctrl_c().await?;
            cancel.cancel();
            task.await?;
        }
        Commands::Login { .. } | Commands::Register(_) | Commands::Logout => {}
    }
    Ok(())
}

fn route_for(command: &Commands) -> Route {
    match command {
        Commands::Cart(_) => Route::Cart,
        Commands::Checkout(_) => Route::Checkout,
        Commands::Orders => Route::Orders,
        Commands::Order { id, .. } => Route::OrderDetail(*id),
        Commands::Prescriptions(_) => Route::Prescriptions,
        Commands::Admin(_) => Route::AdminOrders,
        Commands::Deliveries | Commands::ShareLocation { .. } => Route::MyDeliveries,
        _ => Route::Medicines,
    }
}

fn require(client: &PharmacyClient, route: Route) -> Result<()> {
    match routes::guard(route, client.current_user().as_ref()) {
        Access::Allow => Ok(()),
        Access::RedirectToLogin => bail!("not logged in, run `emed login` first"),
        Access::Forbidden => bail!("{} is not available for this account", route.path()),
    }
}

async fn cart_command(client: &PharmacyClient, command: CartCommands) -> Result<()> {
    let cart = client.cart();
    match command {
        CartCommands::List => {}
        CartCommands::Add { medicine_id, quantity } => {
            let medicine = client.api().get_medicine(medicine_id).await?;
            cart.add_to_cart(&medicine, quantity)?;
        }
        CartCommands::Set { medicine_id, quantity } => cart.update_quantity(medicine_id, quantity)?,
        CartCommands::Remove { medicine_id } => cart.remove_from_cart(medicine_id)?,
        CartCommands::Clear => cart.clear_cart()?,
    }

    for item in cart.items() {
        println!(
            "#{:<5} {:<32} x{:<3} {:>8.2}",
            item.medicine_id, item.medicine_name, item.quantity, item.total_price
        );
    }
    println!("{} item(s), total {:.2}", cart.item_count(), cart.cart_total());
    Ok(())
}

async fn admin_command(client: &PharmacyClient, command: AdminCommands) -> Result<()> {
    match command {
        AdminCommands::Orders => {
            let view = AdminOrdersView::new(client.api().clone());
            view.load().await;
            print_admin_orders(&view)?;
        }
        AdminCommands::Advance { order_id, action, notes } => {
            let view = AdminOrdersView::new(client.api().clone());
            view.load().await;
            view.apply(order_id, action.into(), notes.as_deref()).await?;
            print_admin_orders(&view)?;
        }
        AdminCommands::Assign { order_id, partner_id } => {
            let view = AdminOrdersView::new(client.api().clone());
            view.load_partners().await?;
            if !view.partners().iter().any(|p| p.id == partner_id) {
                bail!("user #{} is not an active delivery partner", partner_id);
            }
            view.assign(order_id, partner_id).await?;
            print_admin_orders(&view)?;
        }
        AdminCommands::Prescriptions => {
            let mut review = PrescriptionReview::new(client.api().clone());
            review.load().await;
            print_pending(&review)?;
        }
        AdminCommands::Verify { prescription_id, decision, notes, medicines } => {
            let form = ReviewForm {
                decision: Some(match decision {
                    DecisionArg::Verified => VerificationDecision::Verified,
                    DecisionArg::Rejected => VerificationDecision::Rejected,
                }),
                notes,
                extracted_medicines: medicines,
            };
            let mut review = PrescriptionReview::new(client.api().clone());
            let prescription = review.verify(prescription_id, &form).await?;
            println!("Prescription #{} is now {}", prescription.id, prescription.status.as_str());
            print_pending(&review)?;
        }
    }
    Ok(())
}

fn order_line(order: &Order) -> String {
    let emergency = if order.is_emergency { " [EMERGENCY]" } else { "" };
    format!(
        "#{:<5} {:<16} {:<18} {:>8.2}{}",
        order.id,
        order.order_number,
        order_status::status_label(order.status),
        order.total_amount,
        emergency
    )
}

fn print_orders(state: &ViewState<Vec<Order>>) -> Result<()> {
    match state {
        ViewState::Ready(orders) if orders.is_empty() => println!("No orders yet"),
        ViewState::Ready(orders) => orders.iter().for_each(|o| println!("{}", order_line(o))),
        ViewState::Failed(error) => bail!("{}", error),
        ViewState::Loading => {}
    }
    Ok(())
}

fn print_admin_orders(view: &AdminOrdersView) -> Result<()> {
    if let Some(error) = view.action_error() {
        eprintln!("{}", error);
    }
    match view.orders() {
        ViewState::Ready(orders) => {
            for order in &orders {
                let actions: Vec<_> = order_status::admin_actions(order.status)
                    .iter()
                    .map(|a| a.label())
                    .collect();
                println!("{}  {}", order_line(order), actions.join(" | "));
            }
        }
        ViewState::Failed(error) => bail!("{}", error),
        ViewState::Loading => {}
    }
    Ok(())
}

fn print_pending(review: &PrescriptionReview) -> Result<()> {
    match review.state() {
        ViewState::Ready(list) if list.is_empty() => println!("No prescriptions awaiting verification"),
        ViewState::Ready(list) => {
            for p in list {
                println!(
                    "#{:<5} user {:<5} {} {}",
                    p.id,
                    p.user_id,
                    p.hospital_name.as_deref().unwrap_or("-"),
                    p.file_url
                );
            }
        }
        ViewState::Failed(error) => bail!("{}", error),
        ViewState::Loading => {}
    }
    Ok(())
}

fn print_order_detail(view: &OrderDetailView) -> Result<()> {
    match view.order() {
        ViewState::Ready(order) => {
            println!("{}", order_line(order));
            println!("  deliver to: {}", order.delivery_address);
            for item in &order.items {
                println!(
                    "  medicine #{} x{} = {:.2}",
                    item.medicine_id, item.quantity, item.total_price
                );
            }
            if let Some(tracking) = view.tracking() {
                println!("  tracking: {}", order_status::status_label(tracking.status));
            }
        }
        ViewState::Failed(error) => bail!("{}", error),
        ViewState::Loading => {}
    }
    Ok(())
}

use axum::{
    routing::{get, post},
    Router,
};
use fapiao_approve_rust::service::ApprovalGateway;
use fapiao_approve_rust::{
    api, create_pool, AccessTokenService, AppConfig, DuplicateCheckService, ReimbursementService,
    RuleValidationService, VerificationService, WeComApprovalGateway, WeComEmployeeDirectory,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 使用本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::from_env();
    info!("Starting server on {}:{}", config.server.host, config.server.port);

    // 创建数据库连接池
    let pool = create_pool(&config.database.url).await?;
    info!("Database pool created");

    // 外部协作方
    let tokens = Arc::new(AccessTokenService::new(config.wecom.clone()));
    let directory = Arc::new(WeComEmployeeDirectory::new(
        config.wecom.clone(),
        tokens.clone(),
    ));
    let verifier = Arc::new(VerificationService::new(config.verification.clone()));
    let gateway: Arc<dyn ApprovalGateway> =
        Arc::new(WeComApprovalGateway::new(config.wecom.clone(), tokens));
    let duplicates = Arc::new(DuplicateCheckService::new(
        pool,
        config.duplicate_check.clone(),
    ));

    // 业务服务
    let rules = Arc::new(RuleValidationService::new(
        config.company.clone(),
        config.verification.enabled,
        verifier,
        directory,
        Some(duplicates.clone()),
    ));
    let reimbursement = Arc::new(ReimbursementService::new(
        config.wecom.clone(),
        gateway,
        Some(duplicates.clone()),
    ));

    // 构建路由
    let validate_routes = Router::new()
        .route("/api/invoice/validate", post(api::validate_invoices))
        .with_state(rules);
    let submit_routes = Router::new()
        .route("/api/reimbursement/submit", post(api::submit_reimbursement))
        .with_state(reimbursement);
    let status_routes = Router::new()
        .route("/api/invoice/status", post(api::update_invoice_status))
        .with_state(duplicates);

    let app = Router::new()
        .route("/health", get(api::health_check))
        .route("/api/invoice/parse", post(api::parse_invoices))
        .merge(validate_routes)
        .merge(submit_routes)
        .merge(status_routes)
        .layer(ServiceBuilder::new());

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST /api/invoice/parse        - 审批单文本解析");
    info!("  POST /api/invoice/validate     - 发票规则校验");
    info!("  POST /api/reimbursement/submit - 报销提交");
    info!("  POST /api/invoice/status       - 发票状态更新");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! Collaborator registration and earnings listing

use anyhow::Result;
use fanledger_business::ServiceContext;
use fanledger_persistence::{CollaboratorRepo, EarningRepo};

use crate::{CollaboratorAction, RecipientArg};

pub async fn handle(ctx: &ServiceContext, action: CollaboratorAction) -> Result<()> {
    let pool = ctx.pool();

    match action {
        CollaboratorAction::Agency { id, name, rate } => {
            CollaboratorRepo::upsert_agency(pool, &id, &name, rate).await?;
            println!("✅ Agency {} ({}) at {}", id, name, rate);
        }
        CollaboratorAction::Creator { id, slug, agency } => {
            CollaboratorRepo::upsert_creator(pool, &id, &slug, agency.as_deref()).await?;
            println!(
                "✅ Creator {} ({}) managed by {}",
                id,
                slug,
                agency.as_deref().unwrap_or("nobody")
            );
        }
        CollaboratorAction::Chatter { id, agency, rate } => {
            CollaboratorRepo::upsert_chatter(pool, &id, &agency, rate).await?;
            println!("✅ Chatter {} of {} at {}", id, agency, rate);
        }
        CollaboratorAction::Persona { id, agency, rate } => {
            CollaboratorRepo::upsert_ai_personality(pool, &id, &agency, rate).await?;
            println!("✅ AI persona {} of {} at {}", id, agency, rate);
        }
    }

    Ok(())
}

pub async fn earnings(ctx: &ServiceContext, recipient: RecipientArg, recipient_id: &str) -> Result<()> {
    let recipient = recipient.to_core_type();
    let rows = EarningRepo::get_by_recipient(ctx.pool(), recipient, recipient_id).await?;
    let pending = EarningRepo::pending_total(ctx.pool(), recipient, recipient_id).await?;

    println!("💵 Earnings for {} {}", recipient.as_str().to_lowercase(), recipient_id);
    for row in &rows {
        println!(
            "   {}  {:<13} {:>6} of {:>6}  rate {:<5} {}",
            row.created_at.format("%Y-%m-%d %H:%M"),
            row.source_type,
            row.share_amount,
            row.gross_amount,
            row.commission_rate,
            row.status
        );
    }
    println!("   Pending total: {}", pending);
    Ok(())
}

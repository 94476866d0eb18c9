//! Terminal output for the `crm` commands.

use anyhow::Result;
use client_core::{CollectionSnapshot, SimulatorSnapshot};
use serde::Serialize;
use shared::protocol::{Bucket, DashboardStats, Lead, ModelInsights, UserProfile};

pub fn json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct PageView<'a> {
    page: u64,
    limit: u64,
    total_found: u64,
    selected: &'a [shared::domain::LeadId],
    data: &'a [Lead],
}

pub fn leads(snapshot: &CollectionSnapshot, as_json: bool) -> Result<()> {
    let window = snapshot.window;
    if as_json {
        return json(&PageView {
            page: window.page + 1,
            limit: window.limit,
            total_found: snapshot.total_found,
            selected: &snapshot.selected,
            data: &snapshot.leads,
        });
    }

    println!(
        "{:>6}  {:>5}  {:<15} {:<12} {:>4}  {}",
        "ID", "SCORE", "POTENTIAL", "STATUS", "AGE", "JOB"
    );
    for lead in &snapshot.leads {
        println!(
            "{:>6}  {:>4}%  {:<15} {:<12} {:>4}  {}",
            lead.id.to_string(),
            lead.score_percent(),
            lead.prediction_label.to_string(),
            lead.status.to_string(),
            lead.profile.age,
            lead.profile.job
        );
    }
    println!(
        "Showing {}-{} of {} (page {} of {})",
        window.start,
        window.end,
        window.total,
        window.page + 1,
        window.last_page() + 1
    );
    Ok(())
}

pub fn lead(lead: &Lead) {
    println!("Lead #{}", lead.id);
    println!(
        "  score      {}% ({})",
        lead.score_percent(),
        lead.prediction_label
    );
    println!("  status     {}", lead.status);
    let profile = &lead.profile;
    println!(
        "  customer   {} y/o, {}, {}, {}",
        profile.age, profile.job, profile.marital, profile.education
    );
    println!(
        "  contact    {} in {} ({}), campaign calls {}",
        profile.contact, profile.month, profile.day_of_week, profile.campaign
    );
    if let Some(created) = lead.created_at {
        println!("  created    {}", created.format("%Y-%m-%d %H:%M"));
    }
    if lead.was_updated() {
        if let Some(updated) = lead.updated_at {
            println!("  updated    {}", updated.format("%Y-%m-%d %H:%M"));
        }
    }
    match lead.notes.as_deref().filter(|notes| !notes.trim().is_empty()) {
        Some(notes) => println!("  notes      {notes}"),
        None => println!("  notes      -"),
    }
    if let Some(explanation) = &lead.explanation {
        println!("  drivers");
        for factor in explanation.strongest(5) {
            println!("    {:<20} {:+.3}", factor.feature, factor.impact);
        }
        if let Some(advice) = &explanation.recommendation {
            println!("  advice     {advice}");
        }
    }
}

pub fn stats(stats: &DashboardStats) {
    println!("Total leads        {}", stats.total_leads);
    println!("High potential     {}", stats.high_potential);
    println!("Medium potential   {}", stats.medium_potential);
    println!("Low potential      {}", stats.low_potential);
    println!("Est. conversion    {:.1}%", stats.conversion_rate_estimate);
    buckets("Score", &stats.score_dist);
    buckets("Age", &stats.age_dist);
    buckets("Job", &stats.job_dist);
}

fn buckets(title: &str, buckets: &[Bucket]) {
    if buckets.is_empty() {
        return;
    }
    println!("{title}");
    for bucket in buckets {
        println!("  {:<20} {}", bucket.name, bucket.value);
    }
}

pub fn profile(profile: &UserProfile) {
    println!("{} ({})", profile.name, profile.role);
    println!("  email          {}", profile.email);
    println!("  employee id    {}", profile.id_emp);
    println!(
        "  progress       {}/{}",
        profile.stats.current_progress, profile.monthly_target
    );
    println!("  processed      {}", profile.stats.leads_processed);
    for activity in &profile.recent_activities {
        println!("  {}  #{} {}", activity.time, activity.lead_id, activity.content);
    }
}

pub fn insights(insights: &ModelInsights) {
    println!("{} (trained {})", insights.model_name, insights.last_trained);
    for feature in insights.ranked() {
        println!("  {:<20} {:.3}", feature.name, feature.impact);
    }
}

pub fn simulation(snapshot: &SimulatorSnapshot, as_json: bool) -> Result<()> {
    let Some(result) = &snapshot.result else {
        return Ok(());
    };
    if as_json {
        return json(result);
    }
    println!(
        "Predicted {:.0}% ({}) for a {} y/o {}",
        result.score * 100.0,
        result.label,
        snapshot.profile.age,
        snapshot.profile.job
    );
    for factor in snapshot.top_factors(3) {
        println!("  {:<20} {:+.3}", factor.feature, factor.impact);
    }
    Ok(())
}

use anyhow::{anyhow, Result};
use clap::Subcommand;

use crate::{
    gateway::entities::{ActivityTemplate, TemplateDraft, TemplateId},
    tracking::{activity::ActivityTracker, notice::Notifier},
};

use super::{print_notices, Context};

#[derive(Subcommand, Debug)]
pub enum ActivityCommand {
    #[command(about = "List activity templates with today's completions")]
    Templates {},
    #[command(name = "template-add", about = "Add an activity to track every day")]
    TemplateAdd {
        #[arg(long, short)]
        name: String,
        #[arg(long, short, default_value = "")]
        description: String,
        #[arg(long, short, default_value = "")]
        icon: String,
    },
    #[command(name = "template-edit", about = "Change an activity template")]
    TemplateEdit {
        #[arg(long)]
        id: u32,
        #[arg(long, short)]
        name: Option<String>,
        #[arg(long, short)]
        description: Option<String>,
        #[arg(long, short)]
        icon: Option<String>,
    },
    #[command(name = "template-rm", about = "Delete an activity template and its completions")]
    TemplateRm {
        #[arg(long)]
        id: u32,
    },
    #[command(about = "Mark an activity done for today, or undo it")]
    Toggle {
        #[arg(long)]
        id: u32,
    },
}

pub async fn process_activity_command(context: &Context, command: ActivityCommand) -> Result<()> {
    let (notifier, mut notices) = Notifier::channel();
    let tracker = ActivityTracker::new(
        context.owner.clone(),
        context.gateway.clone(),
        context.clock.clone(),
        &context.settings,
        notifier,
    );
    tracker.load().await?;

    match command {
        ActivityCommand::Templates {} => {}
        ActivityCommand::TemplateAdd {
            name,
            description,
            icon,
        } => {
            let template = tracker
                .add_template(TemplateDraft {
                    name: name.into(),
                    description: description.into(),
                    icon: icon.into(),
                })
                .await?;
            println!("Added {} with id {}", template.name, template.id);
        }
        ActivityCommand::TemplateEdit {
            id,
            name,
            description,
            icon,
        } => {
            let current = find_template(&tracker, TemplateId(id))?;
            tracker
                .update_template(ActivityTemplate {
                    name: name.map(Into::into).unwrap_or(current.name),
                    description: description.map(Into::into).unwrap_or(current.description),
                    icon: icon.map(Into::into).unwrap_or(current.icon),
                    id: current.id,
                })
                .await?;
        }
        ActivityCommand::TemplateRm { id } => {
            tracker.delete_template(TemplateId(id)).await?;
            println!("Deleted activity {id}");
        }
        ActivityCommand::Toggle { id } => {
            tracker.toggle(TemplateId(id))?;
        }
    }

    tracker.flush().await;
    print_notices(&mut notices);
    print_templates(&tracker);
    Ok(())
}

fn find_template(tracker: &ActivityTracker, id: TemplateId) -> Result<ActivityTemplate> {
    tracker
        .templates()
        .into_iter()
        .find(|v| v.id == id)
        .ok_or_else(|| anyhow!("No activity template with id {id}"))
}

fn print_templates(tracker: &ActivityTracker) {
    let templates = tracker.templates();
    if templates.is_empty() {
        println!("No activities yet, add one with template-add");
        return;
    }
    for template in templates {
        let mark = if tracker.is_completed(template.id) {
            "[x]"
        } else {
            "[ ]"
        };
        println!(
            "{mark} {}\t{} {}\t{}",
            template.id, template.icon, template.name, template.description
        );
    }
    println!(
        "{}/{} done today ({})",
        tracker.completed_count(),
        tracker.daily_goal().get(),
        tracker.progress()
    );
}

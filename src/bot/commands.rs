use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{
        application::{Command, CommandOptionType},
        id::GuildId,
    },
    prelude::Context,
};

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    Command::set_global_commands(&ctx.http, vec![play_command()]).await?;
    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, vec![play_command()]).await?;
    Ok(())
}

pub fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "Nombre o enlace (YouTube, Spotify, Deezer)",
            )
            .required(true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_takes_one_required_query() {
        let json = serde_json::to_value(play_command()).unwrap();
        assert_eq!(json["name"], "play");
        assert_eq!(json["options"][0]["name"], "query");
        assert_eq!(json["options"][0]["required"], true);
        assert_eq!(json["options"].as_array().map(Vec::len), Some(1));
    }
}

use clap::Args;
use levelmux::Logger;

#[derive(Args, Debug)]
pub struct Cmd {
    #[arg(
        id = "target_level",
        value_name = "LEVEL",
        help = "Level to log at, for example info or a level added with --extra-level."
    )]
    pub level: String,

    #[arg(
        trailing_var_arg = true,
        help = "Message arguments. The first one may contain %s, %d, %j or %o placeholders."
    )]
    pub args: Vec<String>,
}

impl Cmd {
    pub fn run(&self, logger: &Logger) -> eyre::Result<()> {
        let method = logger.methods().require(&self.level)?;
        method.log(self.args.iter().cloned());
        Ok(())
    }
}

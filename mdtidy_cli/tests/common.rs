use assert_cmd::Command;

pub fn mdtidy_cmd() -> Command {
	let mut cmd = Command::new(env!("CARGO_BIN_EXE_mdtidy"));
	cmd.env("NO_COLOR", "1").env_remove("MDTIDY_LOG");
	cmd
}

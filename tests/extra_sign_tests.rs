//! Extra file signing tests.

mod helpers;

use helpers::{assert_file_missing, fake_tools, TestEnv};
use secure_squash_root::config::ConfigError;
use secure_squash_root::extra::backup_and_sign_extra_files;
use std::fs;

#[test]
fn test_existing_destination_is_backed_up() {
    let env = TestEnv::new();
    let source = env.root_mount.join("systemd-bootx64.efi");
    let dest = env.efi_partition.join("EFI/systemd/systemd-bootx64.efi");
    fs::write(&source, "new loader").unwrap();
    fs::create_dir_all(dest.parent().unwrap()).unwrap();
    fs::write(&dest, "old loader").unwrap();
    let config = env.config(&format!(
        "[EXTRA_SIGN]\nsystemd = \"{} => {}\"\n",
        source.display(),
        dest.display()
    ));
    let runner = fake_tools("00", None);

    let count = backup_and_sign_extra_files(&runner, &config).unwrap();

    assert_eq!(count, 1);
    assert_eq!(
        fs::read_to_string(env.efi_partition.join("EFI/systemd/systemd-bootx64_backup.efi")).unwrap(),
        "old loader"
    );
    assert_eq!(fs::read_to_string(&dest).unwrap(), "new loader");
    assert_eq!(runner.programs(), vec!["sbsign"]);
}

#[test]
fn test_destination_parent_is_created() {
    let env = TestEnv::new();
    let source = env.root_mount.join("shellx64.efi");
    let dest = env.efi_partition.join("EFI/tools/shellx64.efi");
    fs::write(&source, "shell").unwrap();
    let config = env.config(&format!(
        "[EXTRA_SIGN]\nshell = \"{} => {}\"\n",
        source.display(),
        dest.display()
    ));
    let runner = fake_tools("00", None);

    backup_and_sign_extra_files(&runner, &config).unwrap();

    assert_eq!(fs::read_to_string(&dest).unwrap(), "shell");
    assert_file_missing(&env.efi_partition.join("EFI/tools/shellx64_backup.efi"));
}

#[test]
fn test_malformed_entry_rejected_before_signing() {
    let env = TestEnv::new();
    let toml = format!(
        "ROOT_MOUNT = \"{}\"\nEFI_PARTITION = \"{}\"\nCMDLINE = \"rw\"\n\
         [EXTRA_SIGN]\nbroken = \"/a => /b => /c\"\n",
        env.root_mount.display(),
        env.efi_partition.display()
    );

    let err = secure_squash_root::config::Config::from_toml_str(&toml).unwrap_err();

    assert!(matches!(err, ConfigError::ExtraSign { ref name } if name == "broken"));
    assert!(err.to_string().contains("name = SOURCE => DEST"));
}

#[test]
fn test_sign_failure_reports_entry() {
    let env = TestEnv::new();
    let source = env.root_mount.join("a.efi");
    fs::write(&source, "a").unwrap();
    let config = env.config(&format!(
        "[EXTRA_SIGN]\nloader = \"{} => {}/a.efi\"\n",
        source.display(),
        env.efi_partition.display()
    ));
    let runner = fake_tools("00", Some("sbsign"));

    let err = backup_and_sign_extra_files(&runner, &config).unwrap_err();

    assert!(format!("{:#}", err).contains("'loader'"));
}

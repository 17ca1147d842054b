pub mod workstation;

//! Terraform module for an EKS cluster
//!
//! Either creates a VPC or reuses an existing one, then declares the
//! cluster and its worker autoscaling groups.

use rigging_core::CoreError;
use rigging_core::asset::{AmazonEksAsset, EksAutoscalingGroup, EksCreatedVpc, EksExistingVpc};
use std::fmt::Write;

use crate::error::Result;

/// Default output file for generated EKS modules
pub const DEFAULT_DEST: &str = "amazon_eks.tf";

/// Double-quoted HCL string literal
///
/// Interpolation markers are doubled so values are taken literally.
fn hcl_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn hcl_list(items: &[String]) -> String {
    if items.is_empty() {
        return "[]".to_string();
    }
    let mut out = String::from("[\n");
    for item in items {
        let _ = writeln!(out, "    {},", hcl_quote(item));
    }
    out.push_str("  ]");
    out
}

fn created_vpc(out: &mut String, vpc: &EksCreatedVpc) {
    let _ = write!(
        out,
        r#"
variable "vpc_cidr" {{
  type    = "string"
  default = {cidr}
}}

variable "vpc_public_subnets" {{
  default = {public}
}}

variable "vpc_private_subnets" {{
  default = {private}
}}

variable "vpc_azs" {{
  default = {zones}
}}

module "vpc" {{
  source  = "terraform-aws-modules/vpc/aws"
  version = "1.60.0"
  name    = "eks-vpc"
  cidr    = "${{var.vpc_cidr}}"
  azs     = "${{var.vpc_azs}}"

  private_subnets = "${{var.vpc_private_subnets}}"
  public_subnets  = "${{var.vpc_public_subnets}}"

  map_public_ip_on_launch = true
  enable_nat_gateway      = true
  single_nat_gateway      = true

  tags = {{
    "kubernetes.io/cluster/${{local.eks_cluster_name}}" = "shared"
  }}
}}

locals {{
  "eks_vpc"                 = "${{module.vpc.vpc_id}}"
  "eks_vpc_public_subnets"  = "${{module.vpc.public_subnets}}"
  "eks_vpc_private_subnets" = "${{module.vpc.private_subnets}}"
}}
"#,
        cidr = hcl_quote(&vpc.vpc_cidr),
        public = hcl_list(&vpc.public_subnets),
        private = hcl_list(&vpc.private_subnets),
        zones = hcl_list(&vpc.zones),
    );
}

fn existing_vpc(out: &mut String, vpc: &EksExistingVpc) {
    let _ = write!(
        out,
        r#"
locals {{
  "eks_vpc"                 = {vpc_id}
  "eks_vpc_public_subnets"  = {public}
  "eks_vpc_private_subnets" = {private}
}}
"#,
        vpc_id = hcl_quote(&vpc.vpc_id),
        public = hcl_list(&vpc.public_subnets),
        private = hcl_list(&vpc.private_subnets),
    );
}

fn worker_groups(out: &mut String, groups: &[EksAutoscalingGroup]) {
    let _ = write!(
        out,
        "\nlocals {{\n  \"worker_group_count\" = \"{}\"\n}}\n\nlocals {{\n  \"worker_groups\" = [\n",
        groups.len()
    );
    for group in groups {
        let _ = write!(
            out,
            r#"    {{
      name                 = {name}
      asg_min_size         = {size}
      asg_max_size         = {size}
      asg_desired_capacity = {size}
      instance_type        = {machine}

      subnets = "${{join(",", local.eks_vpc_private_subnets)}}"
    }},
"#,
            name = hcl_quote(&group.name),
            size = hcl_quote(&group.group_size),
            machine = hcl_quote(&group.machine_type),
        );
    }
    out.push_str("  ]\n}\n");
}

/// Terraform source for `asset`; its fields must already be rendered
///
/// The module references the VPC locals, so one of `created_vpc` or
/// `existing_vpc` is required.
pub fn generate(asset: &AmazonEksAsset) -> Result<String> {
    if asset.created_vpc.is_none() && asset.existing_vpc.is_none() {
        return Err(CoreError::InvalidAsset {
            message: format!(
                "amazon_eks cluster '{}': a VPC must be created or predefined",
                asset.cluster_name
            ),
        }
        .into());
    }

    let mut out = String::new();
    let _ = write!(
        out,
        r#"locals {{
  "eks_cluster_name" = {name}
}}

provider "aws" {{
  version = "~> 2.7.0"
  region  = {region}
}}
"#,
        name = hcl_quote(&asset.cluster_name),
        region = hcl_quote(&asset.region),
    );

    match (&asset.created_vpc, &asset.existing_vpc) {
        (Some(vpc), _) => created_vpc(&mut out, vpc),
        (None, Some(vpc)) => existing_vpc(&mut out, vpc),
        (None, None) => {}
    }

    worker_groups(&mut out, &asset.autoscaling_groups);

    out.push_str(
        r#"
module "eks" {
  source  = "terraform-aws-modules/eks/aws"
  version = "3.0.0"

  cluster_name = "${local.eks_cluster_name}"

  subnets = ["${local.eks_vpc_private_subnets}", "${local.eks_vpc_public_subnets}"]

  vpc_id = "${local.eks_vpc}"

  worker_groups      = "${local.worker_groups}"
  worker_group_count = "${local.worker_group_count}"
}
"#,
    );

    Ok(out)
}
